// envclone/src/utils/tables.rs
// Table catalog defaults for the property-management schema.

/// Clone order: reference tables first, then tables that point at them.
pub const CLONE_ORDER: &[&str] = &[
    "currencies",
    "categories",
    "zone_areas",
    "internet_connection_types",
    "payment_methods",
    "loft_owners",
    "lofts",
    "teams",
    "team_members",
    "tasks",
    "transactions",
    "transaction_category_references",
    "settings",
];

/// Tables holding personal data, credentials or free text.
pub const SENSITIVE_TABLES: &[&str] = &["profiles", "user_sessions", "notifications", "messages"];

/// Profile-like tables (inbound references) and singleton settings.
pub const UPSERT_TABLES: &[&str] = &["profiles", "settings"];

pub const PREFLIGHT_TABLES: &[&str] = &["profiles", "lofts", "transactions", "categories", "currencies"];

/// Every table the schema tools compare across environments.
pub const EXPECTED_TABLES: &[&str] = &[
    "profiles",
    "user_sessions",
    "zone_areas",
    "internet_connection_types",
    "loft_owners",
    "lofts",
    "categories",
    "currencies",
    "payment_methods",
    "teams",
    "team_members",
    "tasks",
    "transactions",
    "notifications",
    "transaction_category_references",
    "settings",
    "conversations",
    "conversation_participants",
    "messages",
];

pub fn owned(tables: &[&str]) -> Vec<String> {
    tables.iter().map(|t| t.to_string()).collect()
}

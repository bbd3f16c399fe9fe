use uuid::Uuid;

/// Generate an alarm ID of the form `alm_<12 hex chars>`.
pub fn alarm_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("alm_{}", &hex[..12])
}

use crate::auth::Role;
use rusqlite::{Connection, OptionalExtension};

// Policy checks, one function per guarded surface. Role gates are static;
// recording additionally checks section ownership for teachers. A user with
// no role row fails every gate.

pub fn can_view_roster(role: Option<Role>) -> bool {
    matches!(role, Some(Role::Admin | Role::Teacher))
}

pub fn can_record_attendance(role: Option<Role>) -> bool {
    matches!(role, Some(Role::Admin | Role::Teacher))
}

pub fn can_view_reports(role: Option<Role>) -> bool {
    matches!(role, Some(Role::Admin | Role::Teacher))
}

/// Row-level check for recording: admins may record for any section, a
/// teacher only for sections assigned to them.
pub fn can_record_for_section(
    conn: &Connection,
    role: Option<Role>,
    user_id: &str,
    section_id: &str,
) -> Result<bool, rusqlite::Error> {
    if role == Some(Role::Admin) {
        return Ok(true);
    }
    let assigned: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sections WHERE id = ? AND teacher_id = ?",
            (section_id, user_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(assigned.is_some())
}

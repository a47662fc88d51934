use crate::auth::{self, Role};
use crate::db;
use chrono::{Days, Local};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

/// Roles plus the bootstrap admin. Safe to run on every boot.
pub fn seed_core(conn: &Connection) -> anyhow::Result<()> {
    for role in [Role::Admin, Role::Teacher, Role::Student, Role::Parent] {
        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM roles WHERE name = ?",
                [role.as_str()],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_none() {
            conn.execute(
                "INSERT INTO roles(id, name, permissions) VALUES(?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    role.as_str(),
                    serde_json::to_string(role.default_permissions())?,
                ),
            )?;
        }
    }

    ensure_user(
        conn,
        "Super Admin",
        "admin@example.com",
        "password",
        Role::Admin,
    )?;
    Ok(())
}

/// Demo dataset for local development: classes, sections, a teacher, two
/// students, a parent link and a week of attendance.
pub fn seed_sample(conn: &Connection) -> anyhow::Result<()> {
    seed_core(conn)?;

    let classes = [
        ("Primary 1", "primary"),
        ("Primary 2", "primary"),
        ("Junior 1", "junior"),
    ];
    for (name, level) in classes {
        if lookup_class(conn, name)?.is_none() {
            let now = db::now_timestamp();
            conn.execute(
                "INSERT INTO classes(id, name, level, created_at, updated_at)
                 VALUES(?, ?, ?, ?, ?)",
                (Uuid::new_v4().to_string(), name, level, &now, &now),
            )?;
        }
    }

    let teacher_id = ensure_user(
        conn,
        "Demo Teacher",
        "teacher1@example.com",
        "password",
        Role::Teacher,
    )?;

    let Some(class1) = lookup_class(conn, "Primary 1")? else {
        return Ok(());
    };
    let class2 = lookup_class(conn, "Primary 2")?;

    ensure_section(conn, "A", &class1, Some(&teacher_id))?;
    ensure_section(conn, "B", &class1, None)?;
    if let Some(class2) = class2.as_deref() {
        ensure_section(conn, "A", class2, None)?;
    }

    let first_section: Option<String> = conn
        .query_row("SELECT id FROM sections ORDER BY rowid LIMIT 1", [], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(section_id) = first_section else {
        return Ok(());
    };

    let students = [
        ("Student One", "student1@example.com", "ADM001", "2014-01-01"),
        ("Student Two", "student2@example.com", "ADM002", "2014-06-01"),
    ];
    for (name, email, admission_no, dob) in students {
        let user_exists: Option<String> = conn
            .query_row("SELECT id FROM users WHERE email = ?", [email], |r| {
                r.get(0)
            })
            .optional()?;
        if user_exists.is_some() {
            continue;
        }
        let uid = ensure_user(conn, name, email, "password", Role::Student)?;
        let now = db::now_timestamp();
        conn.execute(
            "INSERT INTO students(id, user_id, admission_no, dob, section_id, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &uid,
                admission_no,
                dob,
                &section_id,
                &now,
                &now,
            ),
        )?;
    }

    seed_attendance_week(conn)?;

    // Attach a demo parent to the first student for local dev convenience.
    let parent_id = ensure_user(
        conn,
        "Demo Parent",
        "parent1@example.com",
        "password",
        Role::Parent,
    )?;
    let first_student: Option<String> = conn
        .query_row("SELECT id FROM students ORDER BY rowid LIMIT 1", [], |r| {
            r.get(0)
        })
        .optional()?;
    if let Some(student_id) = first_student {
        conn.execute(
            "INSERT INTO guardian_students(guardian_id, student_id, created_at)
             VALUES(?, ?, ?)
             ON CONFLICT(guardian_id, student_id) DO NOTHING",
            (&parent_id, &student_id, db::now_timestamp()),
        )?;
    }

    Ok(())
}

/// Attendance for the past seven days for every student. Mostly present,
/// deterministic so repeated seeding and tests stay stable.
fn seed_attendance_week(conn: &Connection) -> anyhow::Result<()> {
    let recorder: Option<String> = conn
        .query_row(
            "SELECT id FROM users WHERE email = 'admin@example.com'",
            [],
            |r| r.get(0),
        )
        .optional()?;
    let Some(recorder) = recorder else {
        return Ok(());
    };

    let mut stmt = conn.prepare("SELECT id, section_id FROM students ORDER BY rowid")?;
    let students = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let today = Local::now().date_naive();
    let tx = conn.unchecked_transaction()?;
    for (si, (student_id, section_id)) in students.iter().enumerate() {
        for day in 0..7u64 {
            let Some(date) = today.checked_sub_days(Days::new(day)) else {
                continue;
            };
            let status = if (si as u64 + day) % 9 == 0 {
                "absent"
            } else {
                "present"
            };
            let now = db::now_timestamp();
            tx.execute(
                "INSERT INTO attendance(id, student_id, teacher_id, section_id, date, status, created_at, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(student_id, section_id, date) DO NOTHING",
                (
                    Uuid::new_v4().to_string(),
                    student_id,
                    &recorder,
                    section_id,
                    date.format("%Y-%m-%d").to_string(),
                    status,
                    &now,
                    &now,
                ),
            )?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn lookup_class(conn: &Connection, name: &str) -> anyhow::Result<Option<String>> {
    Ok(conn
        .query_row("SELECT id FROM classes WHERE name = ?", [name], |r| {
            r.get(0)
        })
        .optional()?)
}

fn ensure_section(
    conn: &Connection,
    name: &str,
    class_id: &str,
    teacher_id: Option<&str>,
) -> anyhow::Result<String> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM sections WHERE name = ? AND class_id = ?",
            (name, class_id),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    let now = db::now_timestamp();
    conn.execute(
        "INSERT INTO sections(id, name, class_id, teacher_id, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, name, class_id, teacher_id, &now, &now),
    )?;
    Ok(id)
}

fn ensure_user(
    conn: &Connection,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
) -> anyhow::Result<String> {
    let existing: Option<String> = conn
        .query_row("SELECT id FROM users WHERE email = ?", [email], |r| {
            r.get(0)
        })
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    let role_id: String = conn.query_row(
        "SELECT id FROM roles WHERE name = ?",
        [role.as_str()],
        |r| r.get(0),
    )?;
    let id = Uuid::new_v4().to_string();
    let now = db::now_timestamp();
    conn.execute(
        "INSERT INTO users(id, name, email, password_hash, role_id, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            name,
            email,
            auth::hash_password(password)?,
            &role_id,
            &now,
            &now,
        ),
    )?;
    Ok(id)
}

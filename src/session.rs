//! Session store (C6): one JSON file per session, directory-scan listing
//! sorted newest-first, tolerant of unreadable files in `list()`.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::message::Message;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub cwd: String,
    pub model: String,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub messages: Vec<Message>,
}

impl Session {
    pub fn new(id: String, cwd: String, model: String, now: i64) -> Self {
        Session { id, cwd, model, title: String::new(), created_at: now, updated_at: now, messages: Vec::new() }
    }
}

fn sessions_dir(workdir: &Path) -> PathBuf {
    workdir.join(".milo").join("sessions")
}

/// 8 lowercase hex chars from 4 random bytes.
pub fn generate_id() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn save(workdir: &Path, session: &Session) -> io::Result<()> {
    let dir = sessions_dir(workdir);
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.json", session.id));
    let body = serde_json::to_string_pretty(session)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

pub fn load(workdir: &Path, id: &str) -> io::Result<Session> {
    let path = sessions_dir(workdir).join(format!("{id}.json"));
    let raw = fs::read_to_string(&path)?;
    serde_json::from_str(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn delete(workdir: &Path, id: &str) -> io::Result<()> {
    let path = sessions_dir(workdir).join(format!("{id}.json"));
    fs::remove_file(path)
}

/// List all sessions, newest-updated first. Corrupt or unreadable files are
/// silently skipped rather than failing the whole listing.
pub fn list(workdir: &Path) -> io::Result<Vec<Session>> {
    let dir = sessions_dir(workdir);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut sessions: Vec<Session> = fs::read_dir(&dir)?
        .flatten()
        .filter(|e| e.path().extension().map(|x| x == "json").unwrap_or(false))
        .filter_map(|e| fs::read_to_string(e.path()).ok())
        .filter_map(|raw| serde_json::from_str::<Session>(&raw).ok())
        .collect();
    sessions.sort_by_key(|s| std::cmp::Reverse(s.updated_at));
    Ok(sessions)
}

pub fn most_recent(workdir: &Path) -> io::Result<Option<Session>> {
    Ok(list(workdir)?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(generate_id(), "/repo".into(), "gpt-4o".into(), 100);
        session.messages.push(Message::user_text("hi"));
        save(dir.path(), &session).unwrap();

        let loaded = load(dir.path(), &session.id).unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.messages.len(), 1);
    }

    #[test]
    fn list_sorts_newest_first_and_skips_corrupt_files() {
        let dir = tempdir().unwrap();
        let s1 = Session::new("aaaaaaaa".into(), "/r".into(), "m".into(), 100);
        let s2 = Session::new("bbbbbbbb".into(), "/r".into(), "m".into(), 200);
        save(dir.path(), &s1).unwrap();
        save(dir.path(), &s2).unwrap();
        fs::write(sessions_dir(dir.path()).join("corrupt.json"), "not json").unwrap();

        let sessions = list(dir.path()).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, "bbbbbbbb");
    }

    #[test]
    fn delete_removes_session_file() {
        let dir = tempdir().unwrap();
        let session = Session::new(generate_id(), "/repo".into(), "m".into(), 0);
        save(dir.path(), &session).unwrap();
        delete(dir.path(), &session.id).unwrap();
        assert!(load(dir.path(), &session.id).is_err());
    }

    #[test]
    fn generated_ids_are_eight_hex_chars() {
        let id = generate_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

//! Line-oriented management command grammar.
//!
//! A command is a single newline-terminated line; the response is a single
//! line starting with `+OK` or `-ERR`.

use crate::dissector::Dissector;
use crate::metrics::Metrics;
use crate::userstore::UserStore;
use std::cell::RefCell;
use std::rc::Rc;

pub struct Collaborators {
    pub users: Rc<RefCell<UserStore>>,
    pub dissector: Rc<Dissector>,
    pub metrics: Rc<Metrics>,
}

/// Executes a single command line and returns the response line (without
/// the trailing newline).
pub fn execute(line: &str, collab: &Collaborators) -> String {
    let mut parts = line.trim().split_whitespace();
    match parts.next() {
        Some("USERS") => {
            let users = collab.users.borrow();
            format!("+OK {}", users.usernames().join(" "))
        }
        Some("ADDUSER") => {
            let (Some(name), Some(pass)) = (parts.next(), parts.next()) else {
                return "-ERR usage: ADDUSER <name> <pass>".to_string();
            };
            match collab.users.borrow_mut().add(name, pass) {
                Ok(()) => "+OK".to_string(),
                Err(e) => format!("-ERR {e}"),
            }
        }
        Some("DELUSER") => {
            let Some(name) = parts.next() else {
                return "-ERR usage: DELUSER <name>".to_string();
            };
            match collab.users.borrow_mut().remove(name) {
                Ok(()) => "+OK".to_string(),
                Err(e) => format!("-ERR {e}"),
            }
        }
        Some("DISSECTOR") => match parts.next() {
            None => format!("+OK {}", if collab.dissector.enabled() { "ON" } else { "OFF" }),
            Some("ON") => {
                collab.dissector.set_enabled(true);
                "+OK".to_string()
            }
            Some("OFF") => {
                collab.dissector.set_enabled(false);
                "+OK".to_string()
            }
            Some(_) => "-ERR usage: DISSECTOR [ON|OFF]".to_string(),
        },
        Some("STATS") => {
            let snap = collab.metrics.snapshot();
            format!(
                "+OK current={} max={} total={} sent={} received={}",
                snap.current_connections, snap.max_concurrent, snap.total_connections, snap.bytes_sent, snap.bytes_received
            )
        }
        _ => "-ERR unknown command".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collab() -> Collaborators {
        Collaborators {
            users: Rc::new(RefCell::new(UserStore::from_entries(vec![("alice".into(), "a".into())]))),
            dissector: Rc::new(Dissector::new(false)),
            metrics: Rc::new(Metrics::new()),
        }
    }

    #[test]
    fn users_lists_usernames() {
        assert_eq!(execute("USERS", &collab()), "+OK alice");
    }

    #[test]
    fn adduser_then_users_reflects_it() {
        let c = collab();
        assert_eq!(execute("ADDUSER bob secret", &c), "+OK");
        assert!(execute("USERS", &c).contains("bob"));
    }

    #[test]
    fn deluser_refuses_last_user() {
        let c = collab();
        assert_eq!(execute("DELUSER alice", &c), "-ERR refusing to remove the last user");
    }

    #[test]
    fn dissector_toggle_round_trips() {
        let c = collab();
        assert_eq!(execute("DISSECTOR", &c), "+OK OFF");
        assert_eq!(execute("DISSECTOR ON", &c), "+OK");
        assert_eq!(execute("DISSECTOR", &c), "+OK ON");
    }

    #[test]
    fn unknown_command_is_err() {
        assert_eq!(execute("FROBNICATE", &collab()), "-ERR unknown command");
    }
}

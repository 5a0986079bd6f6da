//! In-memory username/password table.
//!
//! Seeded from CLI `-u` flags (up to `MAX_USERS`), mutable at runtime from
//! the management channel, consulted from the proxy core via `verify`.

pub const MAX_USERS: usize = 10;

#[derive(Debug)]
pub struct UserStore {
    entries: Vec<(String, String)>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum UserStoreError {
    Full,
    AlreadyExists,
    NotFound,
    LastUser,
}

impl std::fmt::Display for UserStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserStoreError::Full => write!(f, "user table is full"),
            UserStoreError::AlreadyExists => write!(f, "user already exists"),
            UserStoreError::NotFound => write!(f, "no such user"),
            UserStoreError::LastUser => write!(f, "refusing to remove the last user"),
        }
    }
}

impl UserStore {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn from_entries(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    pub fn verify(&self, name: &str, pass: &str) -> bool {
        self.entries.iter().any(|(u, p)| u == name && p == pass)
    }

    pub fn usernames(&self) -> Vec<&str> {
        self.entries.iter().map(|(u, _)| u.as_str()).collect()
    }

    pub fn add(&mut self, name: &str, pass: &str) -> Result<(), UserStoreError> {
        if self.entries.iter().any(|(u, _)| u == name) {
            return Err(UserStoreError::AlreadyExists);
        }
        if self.entries.len() >= MAX_USERS {
            return Err(UserStoreError::Full);
        }
        self.entries.push((name.to_string(), pass.to_string()));
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<(), UserStoreError> {
        if self.entries.len() <= 1 {
            return Err(UserStoreError::LastUser);
        }
        let before = self.entries.len();
        self.entries.retain(|(u, _)| u != name);
        if self.entries.len() == before {
            return Err(UserStoreError::NotFound);
        }
        Ok(())
    }
}

impl Default for UserStore {
    fn default() -> Self {
        Self::new()
    }
}

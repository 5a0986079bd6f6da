//! Parser for the RFC 1929 username/password sub-negotiation frame:
//! `VER(1)=0x01, ULEN(1), UNAME(ULEN), PLEN(1), PASSWD(PLEN)`.

use super::Outcome;
use crate::socks::wire::AUTH_VERSION;

#[derive(Debug, PartialEq, Eq)]
pub struct UserPass {
    pub username: String,
    pub password: String,
}

pub fn parse(data: &[u8]) -> Outcome<UserPass> {
    if data.is_empty() {
        return Outcome::NeedMore;
    }
    if data[0] != AUTH_VERSION {
        return Outcome::Failed("unsupported auth version");
    }
    if data.len() < 2 {
        return Outcome::NeedMore;
    }
    let ulen = data[1] as usize;
    if ulen == 0 {
        return Outcome::Failed("empty username");
    }
    let uname_end = 2 + ulen;
    if data.len() < uname_end + 1 {
        return Outcome::NeedMore;
    }
    let plen = data[uname_end] as usize;
    if plen == 0 {
        return Outcome::Failed("empty password");
    }
    let passwd_end = uname_end + 1 + plen;
    if data.len() < passwd_end {
        return Outcome::NeedMore;
    }

    let username = match std::str::from_utf8(&data[2..uname_end]) {
        Ok(s) => s.to_string(),
        Err(_) => return Outcome::Failed("username is not valid utf-8"),
    };
    let password = match std::str::from_utf8(&data[uname_end + 1..passwd_end]) {
        Ok(s) => s.to_string(),
        Err(_) => return Outcome::Failed("password is not valid utf-8"),
    };

    Outcome::Done {
        value: UserPass { username, password },
        consumed: passwd_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(user: &str, pass: &str) -> Vec<u8> {
        let mut buf = vec![0x01, user.len() as u8];
        buf.extend_from_slice(user.as_bytes());
        buf.push(pass.len() as u8);
        buf.extend_from_slice(pass.as_bytes());
        buf
    }

    #[test]
    fn parses_complete_frame() {
        let f = frame("alice", "secret");
        match parse(&f) {
            Outcome::Done { value, consumed } => {
                assert_eq!(value.username, "alice");
                assert_eq!(value.password, "secret");
                assert_eq!(consumed, f.len());
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn empty_username_is_auth_error() {
        assert_eq!(parse(&[0x01, 0x00]), Outcome::Failed("empty username"));
    }

    #[test]
    fn empty_password_is_auth_error() {
        let mut f = vec![0x01, 1, b'a'];
        f.push(0x00);
        assert_eq!(parse(&f), Outcome::Failed("empty password"));
    }

    #[test]
    fn restartable_across_arbitrary_chunk_boundaries() {
        let f = frame("bob", "hunter2");
        for split in 0..=f.len() {
            let outcome = parse(&f[..split]);
            if split < f.len() {
                assert!(matches!(outcome, Outcome::NeedMore), "split at {split}");
            } else {
                assert!(matches!(outcome, Outcome::Done { .. }), "split at {split}");
            }
        }
    }
}

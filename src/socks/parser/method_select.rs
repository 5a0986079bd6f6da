//! Parser for the client's method-selection frame:
//! `VER(1)=0x05, NMETHODS(1), METHODS(NMETHODS)`.

use super::Outcome;
use crate::socks::wire::VERSION;

#[derive(Debug, PartialEq, Eq)]
pub struct MethodSelect {
    pub methods: Vec<u8>,
}

/// Parses a method-selection frame from the start of `data`.
///
/// Stateless: re-examines the buffer's accumulated bytes from offset zero on
/// every call, so splitting the input stream at any boundary and feeding it
/// chunk by chunk yields the same outcome as feeding it whole.
pub fn parse(data: &[u8]) -> Outcome<MethodSelect> {
    if data.is_empty() {
        return Outcome::NeedMore;
    }
    let ver = data[0];
    if ver != VERSION {
        return Outcome::Failed("unsupported version");
    }
    if data.len() < 2 {
        return Outcome::NeedMore;
    }
    let nmethods = data[1] as usize;
    if nmethods == 0 {
        return Outcome::Failed("NMETHODS is zero");
    }
    if data.len() < 2 + nmethods {
        return Outcome::NeedMore;
    }
    let methods = data[2..2 + nmethods].to_vec();
    Outcome::Done {
        value: MethodSelect { methods },
        consumed: 2 + nmethods,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_frame() {
        let frame = [0x05, 0x02, 0x00, 0x02];
        match parse(&frame) {
            Outcome::Done { value, consumed } => {
                assert_eq!(value.methods, vec![0x00, 0x02]);
                assert_eq!(consumed, 4);
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn rejects_wrong_version() {
        assert_eq!(parse(&[0x04, 0x01, 0x00]), Outcome::Failed("unsupported version"));
    }

    #[test]
    fn rejects_zero_methods() {
        assert_eq!(parse(&[0x05, 0x00]), Outcome::Failed("NMETHODS is zero"));
    }

    #[test]
    fn needs_more_on_partial_frame() {
        assert_eq!(parse(&[]), Outcome::NeedMore);
        assert_eq!(parse(&[0x05]), Outcome::NeedMore);
        assert_eq!(parse(&[0x05, 0x02, 0x00]), Outcome::NeedMore);
    }

    #[test]
    fn restartable_across_arbitrary_chunk_boundaries() {
        let frame = [0x05u8, 0x03, 0x00, 0x01, 0x02];
        for split in 0..=frame.len() {
            let first = parse(&frame[..split]);
            if split < frame.len() {
                assert!(matches!(first, Outcome::NeedMore), "split at {split}");
            } else {
                assert!(matches!(first, Outcome::Done { .. }), "split at {split}");
            }
        }
    }
}

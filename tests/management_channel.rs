//! End-to-end exercise of the management channel over its own TCP listener.
//!
//! Each management connection handles exactly one command then closes, so
//! every command below opens a fresh connection.

mod common;

use std::io::{BufRead, BufReader, Write};

fn one_shot_command(port: u16, command: &str) -> String {
    let mut stream = common::connect(port);
    stream.write_all(command.as_bytes()).unwrap();
    stream.write_all(b"\n").unwrap();
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    line.trim_end_matches(['\r', '\n']).to_string()
}

#[test]
fn users_and_dissector_toggle_round_trip() {
    common::spawn_server(18161, 18162, vec![("alice", "secret")], false);

    assert_eq!(one_shot_command(18162, "USERS"), "+OK alice");
    assert_eq!(one_shot_command(18162, "DISSECTOR"), "+OK OFF");
    assert_eq!(one_shot_command(18162, "DISSECTOR ON"), "+OK");
    assert_eq!(one_shot_command(18162, "DISSECTOR"), "+OK ON");
    assert_eq!(one_shot_command(18162, "NONSENSE"), "-ERR unknown command");
}

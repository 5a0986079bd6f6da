//! Rejected username/password sub-negotiation tears the connection down
//! after sending the failure status byte.

mod common;

use std::io::Read;

#[test]
fn user_pass_auth_fails_closes_connection() {
    common::spawn_server(18121, 18122, vec![("alice", "secret")], true);

    let mut client = common::connect(18121);
    common::send_negotiation(&mut client, &[0x00, 0x02]);
    let reply = common::read_exact_n(&mut client, 2);
    assert_eq!(reply, vec![0x05, 0x02]);

    common::send_user_pass(&mut client, "alice", "wrong-password");
    let reply = common::read_exact_n(&mut client, 2);
    assert_eq!(reply, vec![0x01, 0x01], "expected auth status FAILURE");

    let mut rest = Vec::new();
    client.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty(), "connection must close after a failed auth reply drains");
}

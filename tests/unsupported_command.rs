//! A request with an unsupported CMD (BIND) is rejected with
//! COMMAND_NOT_SUPPORTED and the connection is torn down.

mod common;

use std::io::Read;

#[test]
fn bind_command_is_rejected() {
    common::spawn_server(18141, 18142, vec![], false);

    let mut client = common::connect(18141);
    common::send_no_auth_negotiation(&mut client);
    let reply = common::read_exact_n(&mut client, 2);
    assert_eq!(reply, vec![0x05, 0x00]);

    common::send_bind_ipv4(&mut client, [127, 0, 0, 1], 9);
    let reply = common::read_exact_n(&mut client, 10);
    assert_eq!(reply[1], 0x07, "expected COMMAND_NOT_SUPPORTED reply code");

    let mut rest = Vec::new();
    client.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty(), "connection must close after the failure reply drains");
}

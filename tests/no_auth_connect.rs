//! No-auth IPv4 CONNECT: negotiate NO_AUTH, connect to a loopback origin,
//! then exercise the relay in both directions.

mod common;

use std::io::{Read, Write};

#[test]
fn no_auth_ipv4_connect_and_relay() {
    let origin_port = common::spawn_echo_origin();
    common::spawn_server(18101, 18102, vec![], true);

    let mut client = common::connect(18101);
    common::send_no_auth_negotiation(&mut client);
    let reply = common::read_exact_n(&mut client, 2);
    assert_eq!(reply, vec![0x05, 0x00]);

    common::send_connect_ipv4(&mut client, [127, 0, 0, 1], origin_port);
    let reply = common::read_exact_n(&mut client, 10);
    assert_eq!(reply[0], 0x05);
    assert_eq!(reply[1], 0x00, "expected SUCCEEDED reply code");
    assert_eq!(reply[3], 0x01, "expected IPv4 bound address type");

    client.write_all(b"hello origin").unwrap();
    let echoed = common::read_exact_n(&mut client, b"hello origin".len());
    assert_eq!(&echoed, b"hello origin");

    client.shutdown(std::net::Shutdown::Write).unwrap();
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());
}

//! Accepted username/password sub-negotiation, then a successful CONNECT.

mod common;

#[test]
fn user_pass_auth_succeeds_then_connects() {
    let origin_port = common::spawn_echo_origin();
    common::spawn_server(18111, 18112, vec![("alice", "secret")], true);

    let mut client = common::connect(18111);
    common::send_negotiation(&mut client, &[0x00, 0x02]);
    let reply = common::read_exact_n(&mut client, 2);
    assert_eq!(reply, vec![0x05, 0x02], "server must pick USER_PASS when auth is configured");

    common::send_user_pass(&mut client, "alice", "secret");
    let reply = common::read_exact_n(&mut client, 2);
    assert_eq!(reply, vec![0x01, 0x00], "expected auth status OK");

    common::send_connect_ipv4(&mut client, [127, 0, 0, 1], origin_port);
    let reply = common::read_exact_n(&mut client, 10);
    assert_eq!(reply[1], 0x00, "expected SUCCEEDED reply code");
}

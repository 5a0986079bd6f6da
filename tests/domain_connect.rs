//! Domain-name CONNECT: exercises async resolution (RequestResolv) before
//! dialing the origin. The origin only listens on IPv4, so on a system
//! where "localhost" resolves to an IPv6 candidate first, this also
//! exercises the connect-failover path in `retry_or_fail_connect`.

mod common;

#[test]
fn domain_connect_resolves_and_connects() {
    let origin_port = common::spawn_echo_origin();
    common::spawn_server(18131, 18132, vec![], true);

    let mut client = common::connect(18131);
    common::send_no_auth_negotiation(&mut client);
    let reply = common::read_exact_n(&mut client, 2);
    assert_eq!(reply, vec![0x05, 0x00]);

    common::send_connect_domain(&mut client, "localhost", origin_port);
    let reply = common::read_exact_n(&mut client, 10);
    assert_eq!(reply[1], 0x00, "expected SUCCEEDED reply code for a resolvable domain");
}

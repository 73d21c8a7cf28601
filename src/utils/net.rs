/// Join a host and port into `host:port`, bracketing IPv6 literals
/// (`::1` + `6379` becomes `[::1]:6379`)
pub fn join_host_port(
    host: &str,
    port: &str,
) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

use crate::utils::net::join_host_port;
use crate::ProtocolError;
use crate::Result;

/// A parsed `+switch-master` notification
///
/// Sentinels publish `<master-name> <old-ip> <old-port> <new-ip> <new-port>`
/// once a failover has completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchMasterEvent {
    pub master_name: String,
    pub old_addr: String,
    pub new_addr: String,
}

impl SwitchMasterEvent {
    pub fn parse(payload: &str) -> Result<Self> {
        let parts: Vec<&str> = payload.split_whitespace().collect();
        match parts.as_slice() {
            [master_name, old_ip, old_port, new_ip, new_port] => Ok(Self {
                master_name: master_name.to_string(),
                old_addr: join_host_port(old_ip, old_port),
                new_addr: join_host_port(new_ip, new_port),
            }),
            _ => Err(ProtocolError::MalformedEvent(payload.to_string()).into()),
        }
    }
}

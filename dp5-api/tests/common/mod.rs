//! Shared test utilities for integration tests.

use dp5_api::RemoteClient;
use dp5_core::config::ServerConfig;

/// Full mock path for an action under the remote stub.
pub fn remote_path(action: &str) -> String {
    format!("/dp5/remote/v1{action}")
}

/// Create a client pointed at a running mock server.
pub fn client_for(server: &mockito::ServerGuard) -> RemoteClient {
    let host_with_port = server.host_with_port();
    let (host, port) = host_with_port
        .rsplit_once(':')
        .expect("mock server address has a port");
    let config = ServerConfig::new(host, port.parse().expect("numeric port"));
    RemoteClient::new(&config).expect("failed to build client")
}

/// A port on localhost with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    port
}

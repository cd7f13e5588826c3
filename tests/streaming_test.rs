//! End-to-end tests over a real TCP connection.
//!
//! Serves the router on an ephemeral port with connection info, speaks
//! HTTP/1.1 directly and checks what actually reaches the wire, including
//! build cleanup when the client hangs up mid-stream.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use buildhook_api::{create_router, AppState};
use buildhook_core::TrustedRanges;
use buildhook_runner::SatisBuild;
use buildhook_testing::{FakeProject, WebhookRequestBuilder, SHELL, WEBHOOK_PATH};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

async fn spawn_server(project: &FakeProject, trusted: TrustedRanges) -> SocketAddr {
    let build = SatisBuild {
        project_dir: project.path().to_path_buf(),
        satis_binary: PathBuf::from(SHELL),
        satis_config: "satis.json".to_string(),
        repository_host: "git@bitbucket.org".to_string(),
        composer_home: None,
        timeout: Duration::from_secs(30),
    };
    let app = create_router(AppState::new(trusted, build));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    addr
}

fn raw_request(builder: &WebhookRequestBuilder) -> Vec<u8> {
    let mut request = format!("POST {WEBHOOK_PATH} HTTP/1.1\r\nHost: localhost\r\n");
    for (name, value) in builder.headers() {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    request.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        builder.body().len()
    ));
    let mut bytes = request.into_bytes();
    bytes.extend_from_slice(builder.body());
    bytes
}

async fn send(addr: SocketAddr, builder: &WebhookRequestBuilder) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&raw_request(builder)).await.unwrap();
    stream
}

async fn read_to_close(mut stream: TcpStream) -> String {
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut response))
        .await
        .expect("server should close the connection")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn build_output_reaches_the_wire_as_events() {
    let project = FakeProject::succeeding().unwrap();
    let addr = spawn_server(&project, TrustedRanges::default()).await;

    let response = read_to_close(send(addr, &WebhookRequestBuilder::new()).await).await;

    assert!(response.starts_with("HTTP/1.1 200 OK"), "unexpected response: {response}");
    assert!(response.to_ascii_lowercase().contains("content-type: text/event-stream"));
    assert!(response.to_ascii_lowercase().contains("x-request-id:"));
    let line1 = response.find("data: line1").expect("line1 event");
    let line2 = response.find("data: line2").expect("line2 event");
    let status = response.find("data: exited with code 0 (OK)").expect("status event");
    let done = response.find("data: __done__").expect("done event");
    assert!(line1 < line2 && line2 < status && status < done);
}

#[tokio::test]
async fn loopback_is_rejected_when_not_trusted() {
    let project = FakeProject::new("touch ran").unwrap();
    let trusted = TrustedRanges::parse(&["10.0.0.0/8"]).unwrap();
    let addr = spawn_server(&project, trusted).await;

    let response = read_to_close(send(addr, &WebhookRequestBuilder::new()).await).await;

    assert!(response.starts_with("HTTP/1.1 403 Forbidden"), "unexpected response: {response}");
    assert!(response.contains("E1002"));
    assert!(!project.path().join("ran").exists());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn client_disconnect_kills_the_build() {
    let project =
        FakeProject::new("echo $$ > pid\nwhile :; do echo tick; sleep 0.1; done").unwrap();
    let addr = spawn_server(&project, TrustedRanges::default()).await;

    let mut stream = send(addr, &WebhookRequestBuilder::new()).await;
    let mut seen = Vec::new();
    let mut chunk = [0_u8; 1024];
    tokio::time::timeout(Duration::from_secs(10), async {
        while !String::from_utf8_lossy(&seen).contains("data: tick") {
            let read = stream.read(&mut chunk).await.unwrap();
            assert!(read > 0, "connection closed before build output");
            seen.extend_from_slice(&chunk[..read]);
        }
    })
    .await
    .expect("build output should arrive");

    let pid = std::fs::read_to_string(project.path().join("pid")).unwrap().trim().to_string();
    drop(stream);

    let proc_entry = PathBuf::from(format!("/proc/{pid}"));
    let mut reaped = false;
    for _ in 0..200 {
        if !proc_entry.exists() {
            reaped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(reaped, "build process {pid} survived client disconnect");
}

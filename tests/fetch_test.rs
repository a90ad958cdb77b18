//! Upstream fetcher caching behaviour, driven against a mock HTTP upstream.

use chart_proxy::chart::fetch::UpstreamFetcher;
use chart_proxy::Config;

const INDEX_YAML: &str = r#"apiVersion: v1
entries:
  mychart:
    - apiVersion: v2
      name: mychart
      version: 1.2.3
      urls:
        - https://charts.example.com/mychart-1.2.3.tgz
"#;

fn fetcher() -> UpstreamFetcher {
    UpstreamFetcher::with_scheme(&Config::default(), "http").unwrap()
}

#[tokio::test]
async fn successful_index_fetches_are_cached() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/index.yaml")
        .with_status(200)
        .with_body(INDEX_YAML)
        .expect(1)
        .create_async()
        .await;

    let fetcher = fetcher();
    let host = server.host_with_port();

    let first = fetcher.get_index(&host).await.unwrap();
    assert!(first.entries.contains_key("mychart"));
    let second = fetcher.get_index(&host).await.unwrap();
    assert!(second.entries.contains_key("mychart"));

    mock.assert_async().await;
}

#[tokio::test]
async fn failed_index_fetches_are_cached_too() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/index.yaml")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let fetcher = fetcher();
    let host = server.host_with_port();

    assert!(fetcher.get_index(&host).await.is_err());
    // second request is answered from the error cache, not the upstream
    assert!(fetcher.get_index(&host).await.is_err());

    mock.assert_async().await;
}

#[tokio::test]
async fn index_without_api_version_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/index.yaml")
        .with_status(200)
        .with_body("entries: {}\n")
        .create_async()
        .await;

    let fetcher = fetcher();
    let err = fetcher.get_index(&server.host_with_port()).await.unwrap_err();
    assert!(err.to_string().contains("apiVersion"));
}

#[tokio::test]
async fn chart_download_propagates_upstream_status() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/charts/missing.tgz")
        .with_status(404)
        .create_async()
        .await;

    let fetcher = fetcher();
    let url = format!("{}/charts/missing.tgz", server.url());
    let err = fetcher.download_chart(&url).await.unwrap_err();
    assert!(err.to_string().contains("404"));
}

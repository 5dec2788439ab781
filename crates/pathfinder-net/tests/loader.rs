//! HttpFetcher against a mock origin.

use pathfinder_net::{
    Bytes, CacheMode, Fetcher, HttpFetcher, LoaderConfig, NetError, Request, ResponseType, StatusCode,
    Url,
};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher_for(server: &MockServer) -> HttpFetcher {
    let origin = Url::parse(&server.uri()).unwrap();
    HttpFetcher::new(&origin, LoaderConfig::default()).unwrap()
}

fn url_on(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
}

#[tokio::test]
async fn test_same_origin_response_is_basic() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    let response = fetcher_for(&server)
        .fetch(Request::navigate(url_on(&server, "/index.html")))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.response_type, ResponseType::Basic);
    assert!(!response.redirected);
    assert_eq!(response.text().unwrap(), "<html></html>");
}

#[tokio::test]
async fn test_reload_mode_sends_no_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manifest.json"))
        .and(header("cache-control", "no-cache"))
        .and(header("pragma", "no-cache"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let request =
        Request::get(url_on(&server, "/manifest.json")).with_cache_mode(CacheMode::Reload);
    let response = fetcher_for(&server).fetch(request).await.unwrap();
    assert!(response.ok());
}

#[tokio::test]
async fn test_not_found_is_returned_not_errored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let response = fetcher_for(&server)
        .fetch(Request::get(url_on(&server, "/missing.png")))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(!response.ok());
}

#[tokio::test]
async fn test_cross_origin_without_cors_is_opaque() {
    let app = MockServer::start().await;
    let cdn = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/font.woff2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
        .mount(&cdn)
        .await;

    let response = fetcher_for(&app)
        .fetch(Request::get(url_on(&cdn, "/font.woff2")))
        .await
        .unwrap();
    assert_eq!(response.response_type, ResponseType::Opaque);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_cross_origin_with_cors_header() {
    let app = MockServer::start().await;
    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("access-control-allow-origin", "*")
                .set_body_string("[]"),
        )
        .mount(&api)
        .await;

    let response = fetcher_for(&app)
        .fetch(Request::get(url_on(&api, "/data.json")))
        .await
        .unwrap();
    assert_eq!(response.response_type, ResponseType::Cors);
    assert_eq!(response.text().unwrap(), "[]");
}

#[tokio::test]
async fn test_redirect_to_other_origin_is_opaque() {
    let app = MockServer::start().await;
    let other = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/elsewhere"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
        .mount(&other)
        .await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("{}/elsewhere", other.uri()).as_str()),
        )
        .mount(&app)
        .await;

    let response = fetcher_for(&app)
        .fetch(Request::get(url_on(&app, "/old")))
        .await
        .unwrap();
    assert!(response.redirected);
    assert_eq!(response.response_type, ResponseType::Opaque);
}

fn redirect_to(target: String) -> ResponseTemplate {
    ResponseTemplate::new(302).insert_header("location", target.as_str())
}

#[tokio::test]
async fn test_same_origin_redirect_stays_basic() {
    let app = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(redirect_to("/index.html".to_string()))
        .mount(&app)
        .await;
    Mock::given(method("GET"))
        .and(path("/index.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("root"))
        .mount(&app)
        .await;

    let response = fetcher_for(&app)
        .fetch(Request::get(url_on(&app, "/")))
        .await
        .unwrap();
    assert!(response.redirected);
    assert_eq!(response.url, url_on(&app, "/index.html"));
    assert_eq!(response.response_type, ResponseType::Basic);
    assert_eq!(response.text().unwrap(), "root");
}

#[tokio::test]
async fn test_round_trip_through_other_origin_is_not_basic() {
    let app = MockServer::start().await;
    let other = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(redirect_to(format!("{}/hop", other.uri())))
        .mount(&app)
        .await;
    Mock::given(method("GET"))
        .and(path("/hop"))
        .respond_with(redirect_to(format!("{}/final", app.uri())))
        .mount(&other)
        .await;
    Mock::given(method("GET"))
        .and(path("/final"))
        .respond_with(ResponseTemplate::new(200).set_body_string("landed"))
        .mount(&app)
        .await;

    let response = fetcher_for(&app)
        .fetch(Request::get(url_on(&app, "/start")))
        .await
        .unwrap();
    assert!(response.redirected);
    assert_eq!(response.url, url_on(&app, "/final"));
    assert_eq!(response.response_type, ResponseType::Opaque);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_cross_origin_request_redirected_into_app_is_not_basic() {
    let app = MockServer::start().await;
    let other = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bounce"))
        .respond_with(redirect_to(format!("{}/index.html", app.uri())))
        .mount(&other)
        .await;
    Mock::given(method("GET"))
        .and(path("/index.html"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("access-control-allow-origin", "*")
                .set_body_string("root"),
        )
        .mount(&app)
        .await;

    let response = fetcher_for(&app)
        .fetch(Request::get(url_on(&other, "/bounce")))
        .await
        .unwrap();
    assert_eq!(response.response_type, ResponseType::Cors);
}

#[tokio::test]
async fn test_fragment_is_not_a_redirect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("root"))
        .mount(&server)
        .await;

    let response = fetcher_for(&server)
        .fetch(Request::navigate(url_on(&server, "/index.html#today")))
        .await
        .unwrap();
    assert!(!response.redirected);
    assert_eq!(response.response_type, ResponseType::Basic);
}

#[tokio::test]
async fn test_see_other_switches_post_to_get() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/habits"))
        .respond_with(ResponseTemplate::new(303).insert_header("location", "/habits/7"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/habits/7"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::post(url_on(&server, "/habits"), Bytes::from_static(b"{}"));
    let response = fetcher_for(&server).fetch(request).await.unwrap();
    assert!(response.ok());
    assert!(response.redirected);
}

#[tokio::test]
async fn test_redirect_loop_is_cut_off() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(redirect_to("/loop".to_string()))
        .mount(&server)
        .await;

    let origin = Url::parse(&server.uri()).unwrap();
    let fetcher = HttpFetcher::new(
        &origin,
        LoaderConfig {
            max_redirects: 3,
            ..Default::default()
        },
    )
    .unwrap();

    let err = fetcher
        .fetch(Request::get(url_on(&server, "/loop")))
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::RequestFailed(_)));
}

#[tokio::test]
async fn test_unparseable_location_is_invalid_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(redirect_to("http://[::1".to_string()))
        .mount(&server)
        .await;

    let err = fetcher_for(&server)
        .fetch(Request::get(url_on(&server, "/broken")))
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::InvalidUrl(_)));
}

#[tokio::test]
async fn test_timeout_surfaces_as_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let origin = Url::parse(&server.uri()).unwrap();
    let fetcher = HttpFetcher::new(
        &origin,
        LoaderConfig {
            default_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        },
    )
    .unwrap();

    let err = fetcher
        .fetch(Request::get(url_on(&server, "/slow")))
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::Timeout(d) if d == Duration::from_millis(50)));
}

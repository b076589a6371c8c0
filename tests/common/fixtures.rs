//! Upstream fixtures mounted on a wiremock server

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Catalog item released on GitHub as `{name}-linux-x64.tar.gz`
pub fn github_item(name: &str) -> String {
    format!(
        r#"{name}:
  website: github
  project_name: acme/{name}
  sample_url: "~/${{tag}}/{name}-${{system}}-${{arch}}${{suffix}}"
  system:
    linux: [linux, .tar.gz]
  architecture:
    amd64: x64
"#
    )
}

/// Catalog item published on F-Droid for arm64 only
pub fn fdroid_item(name: &str, package: &str) -> String {
    format!(
        r#"{name}:
  website: fdroid
  project_name: {package}
  architecture:
    arm64: arm64-v8a
"#
    )
}

/// Latest release lookup answering `tag`, expected `calls` times
pub async fn mount_release(server: &MockServer, name: &str, tag: &str, calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/acme/{}/releases/latest", name)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "tag_name": tag })),
        )
        .expect(calls)
        .named(format!("release lookup for {}", name))
        .mount(server)
        .await;
}

/// Release lookup refused with GitHub's quota message
pub async fn mount_rate_limited(server: &MockServer, name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/acme/{}/releases/latest", name)))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "message": "API rate limit exceeded for 127.0.0.1."
        })))
        .mount(server)
        .await;
}

/// Release asset: HEAD redirects like GitHub does, GET serves `body` `downloads` times
pub async fn mount_asset(server: &MockServer, name: &str, tag: &str, body: &[u8], downloads: u64) {
    let asset = format!(
        "/acme/{name}/releases/download/{tag}/{name}-linux-x64.tar.gz"
    );
    Mock::given(method("HEAD"))
        .and(path(asset.clone()))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/objects/asset"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(asset))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .expect(downloads)
        .named(format!("asset download for {}", name))
        .mount(server)
        .await;
}

/// F-Droid package page listing one arm64 build plus its APK
pub async fn mount_fdroid_package(server: &MockServer, package: &str, code: &str, body: &[u8]) {
    let page = format!(
        r#"<html><body><div class="package-versions"><ul class="package-versions-list">
            <li class="package-version">
                <div class="package-version-header">
                    <a name="suggested"></a>
                    <a name="2.0.1"></a><a name="{code}"></a>
                    Version 2.0.1 ({code})
                </div>
                <p class="package-version-nativecode"><code class="package-nativecode">arm64-v8a</code></p>
            </li>
        </ul></div></body></html>"#
    );
    Mock::given(method("GET"))
        .and(path(format!("/packages/{}/", package)))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(server)
        .await;

    let apk = format!("/repo/{}_{}.apk", package, code);
    Mock::given(method("HEAD"))
        .and(path(apk.clone()))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(apk))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Project without any release, answered the way GitHub does
pub async fn mount_missing_release(server: &MockServer, name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/acme/{}/releases/latest", name)))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "message": "Not Found"
        })))
        .mount(server)
        .await;
}

//! Testable property 7 and scenario S7 (spec.md §8): after a miss,
//! `getVersion(fp) > previous`, and the URL passed to `fetchUpstream`
//! carries `v=<new>` iff `new > 1`.

use std::sync::Arc;

use bytes::Bytes;

use super::test_harness::{self, CountingFetch};
use videogate::upstream::FetchUpstream;
use videogate::version::VersionStore;

#[tokio::test]
async fn clean_state_miss_bumps_version_to_two_and_forwards_v_param() {
    let h = test_harness::harness();
    let recipe = test_harness::recipe("/videos/bump.mp4");
    let key = videogate::fingerprint::fingerprint(&recipe);

    let before = h.versions.get_version(&key).await.unwrap();
    assert_eq!(before, 1, "a clean key starts at version 1");

    let fetch = Arc::new(CountingFetch::new(200, "video/mp4", Bytes::from_static(b"bumped")));
    let fetch_dyn: Arc<dyn FetchUpstream> = fetch.clone();
    let _resp = h
        .orchestrator
        .serve_cached(&test_harness::request("/videos/bump.mp4", ""), &recipe, test_harness::ORIGIN, fetch_dyn)
        .await;

    let after = h.versions.get_version(&key).await.unwrap();
    assert_eq!(after, 2, "spec.md S7: getVersion(fp) = 2 after a clean-state miss");
    assert!(after > before);

    let url = fetch.last_url().expect("fetch must have been called");
    assert!(url.contains("v=2"), "URL must carry v=2 once the version is bumped past 1, got {url}");
}

#[tokio::test]
async fn version_one_never_appears_in_the_forwarded_url() {
    // with no prior miss, a request would bump to version 2 regardless, so
    // this asserts the `with_version_param` no-op rule directly: version 1
    // never produces a `v=` query param at all.
    let url = videogate::upstream::with_version_param("http://origin/videos/a.mp4", 1);
    assert!(!url.contains("v="));
    let url2 = videogate::upstream::with_version_param("http://origin/videos/a.mp4", 2);
    assert!(url2.contains("v=2"));
}

mod support;

use bytes::Bytes;
use difysync::{
   Error,
   config::Config,
   naming::{self, NamingScheme},
   remote::{ListQuery, RemoteClient},
};
use support::{Call, Failure, FakeRemote, MTIME, Op, config};

fn id(path: &str, mtime: i64) -> String {
   let file_name = path.rsplit('/').next().unwrap();
   naming::encode(path, file_name, mtime, NamingScheme::Pattern1)
}

#[tokio::test]
async fn transient_failures_are_retried_up_to_the_limit() {
   let remote = FakeRemote::new();
   let cfg = config(&[]);
   let client = RemoteClient::new(remote.as_ref(), &cfg).unwrap();

   remote.fail(Op::Upload, Failure::Transient, 2);
   let doc = client
      .upload("kb", "a.md", Bytes::from_static(b"a"))
      .await
      .unwrap();
   assert!(doc.is_some());
   assert_eq!(remote.count(Op::Upload), 3);

   remote.clear_calls();
   remote.fail(Op::Upload, Failure::Transient, 3);
   let err = client
      .upload("kb", "b.md", Bytes::from_static(b"b"))
      .await
      .unwrap_err();
   assert!(err.is_retryable());
   assert_eq!(remote.count(Op::Upload), 3);
}

#[tokio::test]
async fn rejections_and_misses_are_not_retried() {
   let remote = FakeRemote::new();
   let cfg = config(&[]);
   let client = RemoteClient::new(remote.as_ref(), &cfg).unwrap();

   remote.fail(Op::Upload, Failure::Rejected, 1);
   let err = client
      .upload("kb", "a.md", Bytes::from_static(b"a"))
      .await
      .unwrap_err();
   assert!(matches!(err, Error::RemoteRejected { status: 400, .. }));

   let err = client.delete("kb", "missing").await.unwrap_err();
   assert!(err.is_not_found());
   assert_eq!(remote.count(Op::Upload), 1);
   assert_eq!(remote.count(Op::Delete), 1);
}

#[tokio::test]
async fn missing_credentials_fail_before_any_request() {
   let remote = FakeRemote::new();
   let cfg = Config { dify_api_key: String::new(), ..config(&[]) };
   assert!(matches!(
      RemoteClient::new(remote.as_ref(), &cfg),
      Err(Error::NotConfigured("dify_api_key"))
   ));
   assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn list_clamps_page_and_limit() {
   let remote = FakeRemote::new();
   let cfg = config(&[]);
   let client = RemoteClient::new(remote.as_ref(), &cfg).unwrap();

   client
      .list("kb", ListQuery { keyword: None, page: 0, limit: 500 })
      .await
      .unwrap();
   assert_eq!(remote.calls(), vec![Call::List { dataset: "kb".into(), page: 1, limit: 100 }]);
}

#[tokio::test]
async fn find_by_identifier_walks_every_page() {
   let remote = FakeRemote::new();
   for i in 0..5 {
      remote.seed("kb", &format!("doc {i}"));
   }
   let cfg = Config { list_page_limit: 2, ..config(&[]) };
   let client = RemoteClient::new(remote.as_ref(), &cfg).unwrap();

   let found = client.find_by_identifier("kb", "doc 4").await.unwrap();
   assert_eq!(found.map(|d| d.name).as_deref(), Some("doc 4"));
   assert_eq!(remote.count(Op::List), 3);

   remote.clear_calls();
   assert!(client.find_by_identifier("kb", "doc 9").await.unwrap().is_none());
   assert_eq!(remote.count(Op::List), 3);
}

#[tokio::test]
async fn find_by_identifier_stops_at_first_hit() {
   let remote = FakeRemote::new();
   for i in 0..5 {
      remote.seed("kb", &format!("doc {i}"));
   }
   let cfg = Config { list_page_limit: 2, ..config(&[]) };
   let client = RemoteClient::new(remote.as_ref(), &cfg).unwrap();

   client.find_by_identifier("kb", "doc 1").await.unwrap();
   assert_eq!(remote.count(Op::List), 1);
}

#[tokio::test]
async fn resolve_prefers_exact_name() {
   let remote = FakeRemote::new();
   let path = "/alice/files/reports/q1.md";
   remote.seed("kb", &id(path, MTIME - 60));
   let exact = remote.seed("kb", &id(path, MTIME));
   let cfg = config(&[]);
   let client = RemoteClient::new(remote.as_ref(), &cfg).unwrap();

   let doc = client
      .resolve_document("kb", &id(path, MTIME))
      .await
      .unwrap()
      .unwrap();
   assert_eq!(doc.id, exact);
}

#[tokio::test]
async fn resolve_tolerates_a_different_timestamp() {
   let remote = FakeRemote::new();
   let path = "/alice/files/reports/q1.md";
   let old = remote.seed("kb", &id(path, MTIME - 86_400));
   remote.seed("kb", &id("/alice/files/reports/q2.md", MTIME));
   let cfg = config(&[]);
   let client = RemoteClient::new(remote.as_ref(), &cfg).unwrap();

   let doc = client
      .resolve_document("kb", &id(path, MTIME))
      .await
      .unwrap()
      .unwrap();
   assert_eq!(doc.id, old);
}

#[tokio::test]
async fn resolve_breaks_ties_on_directory() {
   let remote = FakeRemote::new();
   let elsewhere = remote.seed("kb", &id("/alice/files/archive/q1.md", MTIME - 10));
   let same_dir = remote.seed("kb", &id("/alice/files/reports/q1.md", MTIME - 10));
   let cfg = config(&[]);
   let client = RemoteClient::new(remote.as_ref(), &cfg).unwrap();

   let doc = client
      .resolve_document("kb", &id("/alice/files/reports/q1.md", MTIME))
      .await
      .unwrap()
      .unwrap();
   assert_eq!(doc.id, same_dir);

   let doc = client
      .resolve_document("kb", &id("/alice/files/other/q1.md", MTIME))
      .await
      .unwrap()
      .unwrap();
   assert_eq!(doc.id, elsewhere, "first listed candidate when no shape agrees");
}

#[tokio::test]
async fn resolve_propagates_listing_failures() {
   let remote = FakeRemote::new();
   let cfg = config(&[]);
   let client = RemoteClient::new(remote.as_ref(), &cfg).unwrap();

   remote.fail(Op::List, Failure::Transient, 3);
   let err = client.resolve_document("kb", "x").await.unwrap_err();
   assert!(err.is_retryable());
   assert_eq!(remote.count(Op::List), 3);
}

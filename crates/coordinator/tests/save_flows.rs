mod common;

use std::sync::Arc;

use common::{Harness, page};
use pagedrop_auth::{Credential, CredentialStore, MemoryCredentialStore};
use pagedrop_coordinator::CoordinatorConfig;
use pagedrop_destinations::UploadError;
use pagedrop_protocol::{ConflictAction, MessageResponse, SessionMessage, SessionNotification};

fn github(task_id: u64) -> SessionMessage {
    SessionMessage {
        save_to_github: true,
        github_token: "ghp_x".into(),
        github_user: "me".into(),
        github_repository: "pages".into(),
        github_branch: "main".into(),
        ..page(task_id, "page.html", "<html></html>")
    }
}

fn webdav(task_id: u64, filename: &str) -> SessionMessage {
    SessionMessage {
        save_with_web_dav: true,
        web_dav_url: "https://dav.example.org/".into(),
        web_dav_user: "me".into(),
        ..page(task_id, filename, "<html></html>")
    }
}

#[tokio::test]
async fn local_download_reports_file_url_and_releases_handle() {
    let mut h = Harness::new();
    let message = SessionMessage {
        bookmark_id: Some("b1".into()),
        replace_bookmark_url: true,
        ..page(1, "a#b.html", "<html>hi</html>")
    };

    let response = h.coordinator.handle_message(message, &h.session.clone()).await;

    assert_eq!(response, MessageResponse::Empty);
    let requests = h.downloader.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].filename, "a#b.html");
    assert!(requests[0].url.starts_with("blob:pagedrop/"));
    assert_eq!(
        h.bookmarks.updates.lock().unwrap().clone(),
        vec![("b1".to_string(), "file:///home/me/Downloads/a%23b.html".to_string())]
    );
    assert_eq!(h.terminal(), vec![SessionNotification::End]);
    assert_eq!(h.blobs.released(), vec![requests[0].url.clone()]);
    assert_eq!(h.blobs.live_count(), 0);
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn failed_save_releases_handle_exactly_once() {
    let mut h = Harness::new();
    *h.downloader.fail_with.lock().unwrap() = Some("disk full".into());

    let response = h
        .coordinator
        .handle_message(page(2, "page.html", "<html></html>"), &h.session.clone())
        .await;

    assert_eq!(response, MessageResponse::Empty);
    assert_eq!(
        h.terminal(),
        vec![SessionNotification::Error {
            message: "disk full".into(),
            link: None,
        }]
    );
    assert_eq!(h.blobs.released().len(), 1);
    assert_eq!(h.blobs.live_count(), 0);
    assert!(h.viewer.opened.lock().unwrap().is_empty());
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn failed_save_releases_handle_even_when_viewer_requested() {
    let mut h = Harness::new();
    *h.downloader.fail_with.lock().unwrap() = Some("disk full".into());
    let message = SessionMessage {
        open_saved_page: true,
        ..page(3, "page.html", "<html></html>")
    };

    h.coordinator.handle_message(message, &h.session.clone()).await;

    assert_eq!(h.terminal().len(), 1);
    assert_eq!(h.blobs.released().len(), 1);
    assert!(h.viewer.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn existing_download_skips_background_save() {
    let mut h = Harness::new();
    h.index.add("/home/me/Downloads/page (1).html");
    h.index.add("/home/me/Downloads/page.html");
    let message = SessionMessage {
        background_save: true,
        filename_conflict_action: ConflictAction::Skip,
        ..page(4, "page.html", "<html></html>")
    };

    h.coordinator.handle_message(message, &h.session.clone()).await;

    assert_eq!(h.terminal(), vec![SessionNotification::End]);
    assert!(h.downloader.requests().is_empty());
    assert!(h.blobs.released().is_empty());
    assert_eq!(h.blobs.live_count(), 0);
}

#[tokio::test]
async fn skip_without_match_downloads_with_uniquify() {
    let mut h = Harness::new();
    h.index.add("/home/me/Downloads/other.html");
    let message = SessionMessage {
        background_save: true,
        filename_conflict_action: ConflictAction::Skip,
        ..page(5, "page.html", "<html></html>")
    };

    h.coordinator.handle_message(message, &h.session.clone()).await;

    let requests = h.downloader.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].conflict_action, ConflictAction::Uniquify);
    assert_eq!(h.terminal(), vec![SessionNotification::End]);
}

#[tokio::test]
async fn remote_destinations_skip_the_preflight() {
    let mut h = Harness::new();
    h.index.add("/home/me/Downloads/page.html");
    let message = SessionMessage {
        background_save: true,
        filename_conflict_action: ConflictAction::Skip,
        ..webdav(6, "page.html")
    };

    h.coordinator.handle_message(message, &h.session.clone()).await;

    assert!(h.index.queries.lock().unwrap().is_empty());
    assert_eq!(h.client().uploads().len(), 1);
    assert_eq!(h.terminal(), vec![SessionNotification::End]);
}

#[tokio::test]
async fn editor_short_circuits_dispatch() {
    let mut h = Harness::new();
    let message = SessionMessage {
        open_editor: true,
        save_to_github: true,
        ..page(7, "page.html", "<html>edit me</html>")
    };

    h.coordinator.handle_message(message, &h.session.clone()).await;

    assert_eq!(
        h.notifications(),
        vec![SessionNotification::Edit, SessionNotification::End]
    );
    let opened = h.editor.opened.lock().unwrap().clone();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].tab_index, Some(3));
    assert_eq!(opened[0].content.as_bytes(), b"<html>edit me</html>");
    assert!(opened[0].compression.is_none());
    assert!(h.factory.constructed().is_empty());
}

#[tokio::test]
async fn clipboard_completes_without_side_effects() {
    let mut h = Harness::new();
    let message = SessionMessage {
        save_to_clipboard: true,
        ..page(8, "page.html", "<html></html>")
    };

    h.coordinator.handle_message(message, &h.session.clone()).await;

    assert_eq!(h.notifications(), vec![SessionNotification::End]);
    assert!(h.downloader.requests().is_empty());
    assert!(h.factory.constructed().is_empty());
}

#[tokio::test]
async fn open_saved_page_defers_release_to_viewer() {
    let mut h = Harness::new();
    let message = SessionMessage {
        open_saved_page: true,
        ..page(9, "page.html", "<html></html>")
    };

    h.coordinator.handle_message(message, &h.session.clone()).await;

    let opened = h.viewer.opened.lock().unwrap().clone();
    assert_eq!(opened.len(), 1);
    assert!(!opened[0].compressed);
    assert_eq!(opened[0].tab_index, Some(3));
    assert!(h.blobs.released().is_empty());
    assert_eq!(h.blobs.get(&opened[0].blob_url), Some(b"<html></html>".to_vec()));
}

#[tokio::test]
async fn viewer_failure_releases_handle() {
    let mut h = Harness::new();
    *h.viewer.fail.lock().unwrap() = true;
    let message = SessionMessage {
        open_saved_page: true,
        ..page(10, "page.html", "<html></html>")
    };

    h.coordinator.handle_message(message, &h.session.clone()).await;

    assert_eq!(h.terminal(), vec![SessionNotification::End]);
    assert_eq!(h.blobs.released().len(), 1);
    assert_eq!(h.blobs.live_count(), 0);
}

#[tokio::test]
async fn cancel_mid_upload_aborts_once_and_skips_bookmark() {
    let mut h = Harness::new();
    let registry = Arc::clone(&h.registry);
    *h.client().during_upload.lock().unwrap() = Some(Box::new(move || {
        registry.cancel(11);
    }));
    let message = SessionMessage {
        bookmark_id: Some("b1".into()),
        replace_bookmark_url: true,
        ..github(11)
    };

    let response = h.coordinator.handle_message(message, &h.session.clone()).await;

    assert_eq!(response, MessageResponse::Empty);
    assert_eq!(h.client().aborts(), 1);
    assert!(h.bookmarks.updates.lock().unwrap().is_empty());
    assert_eq!(h.terminal(), vec![SessionNotification::End]);
}

#[tokio::test]
async fn cancelled_before_dispatch_makes_no_network_call() {
    let mut h = Harness::new();
    h.registry.register(12);
    h.registry.cancel(12);

    h.coordinator.handle_message(github(12), &h.session.clone()).await;

    assert!(h.factory.constructed().is_empty());
    assert!(h.client().uploads().is_empty());
    assert_eq!(h.terminal(), vec![SessionNotification::End]);
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn repository_push_result_updates_bookmark() {
    let mut h = Harness::new();
    let message = SessionMessage {
        bookmark_id: Some("b7".into()),
        replace_bookmark_url: true,
        ..github(13)
    };

    h.coordinator.handle_message(message, &h.session.clone()).await;

    assert_eq!(h.factory.constructed(), vec!["repo:pages".to_string()]);
    assert_eq!(
        h.bookmarks.updates.lock().unwrap().clone(),
        vec![("b7".to_string(), "https://remote.example.org/page.html".to_string())]
    );
    assert_eq!(h.terminal(), vec![SessionNotification::End]);
}

#[tokio::test]
async fn token_store_authorizes_and_reports_monotone_progress() {
    let mut h = Harness::new();
    let message = SessionMessage {
        save_to_g_drive: true,
        ..page(14, "page.html", "<html>0123456789</html>")
    };

    h.coordinator.handle_message(message, &h.session.clone()).await;

    assert_eq!(h.credentials.get().map(|c| c.access_token), Some("access-c1".into()));
    assert_eq!(h.factory.constructed(), vec!["token:access-c1".to_string()]);

    let notifications = h.notifications();
    let progress: Vec<(u64, u64)> = notifications
        .iter()
        .filter_map(|n| match n {
            SessionNotification::UploadProgress { offset, size } => Some((*offset, *size)),
            _ => None,
        })
        .collect();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0));
    let size = "<html>0123456789</html>".len() as u64;
    assert_eq!(progress.last(), Some(&(size, size)));
    assert_eq!(notifications.last(), Some(&SessionNotification::End));
}

#[tokio::test]
async fn token_store_uses_cached_credential() {
    let mut h = Harness::with(
        CoordinatorConfig::default(),
        MemoryCredentialStore::with_credential(Credential::new("cached")),
    );
    let message = SessionMessage {
        save_to_g_drive: true,
        ..page(15, "page.html", "<html></html>")
    };

    h.coordinator.handle_message(message, &h.session.clone()).await;

    assert_eq!(h.factory.constructed(), vec!["token:cached".to_string()]);
    assert_eq!(h.backend.exchanges.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(h.terminal(), vec![SessionNotification::End]);
}

#[tokio::test]
async fn destination_errors_are_tagged() {
    let mut h = Harness::new();
    h.client().push(Err(UploadError::Backend("503 unavailable".into())));

    h.coordinator
        .handle_message(webdav(16, "a#b.html"), &h.session.clone())
        .await;

    assert_eq!(h.client().uploads()[0].filename, "a%23b.html");
    assert_eq!(
        h.terminal(),
        vec![SessionNotification::Error {
            message: "503 unavailable (WebDAV)".into(),
            link: None,
        }]
    );
}

#[tokio::test]
async fn error_links_reach_the_session() {
    let mut h = Harness::new();
    h.client().push(Err(UploadError::WithLink {
        message: "repository not found".into(),
        link: "https://help.example.org/repos".into(),
    }));

    h.coordinator.handle_message(github(17), &h.session.clone()).await;

    assert_eq!(
        h.terminal(),
        vec![SessionNotification::Error {
            message: "repository not found (GitHub)".into(),
            link: Some("https://help.example.org/repos".into()),
        }]
    );
}

#[tokio::test]
async fn missing_task_id_still_completes() {
    let mut h = Harness::new();
    let message = SessionMessage {
        task_id: None,
        save_with_companion: true,
        ..page(0, "page.html", "<html></html>")
    };

    h.coordinator.handle_message(message, &h.session.clone()).await;

    assert_eq!(h.companion.saved.lock().unwrap().len(), 1);
    assert_eq!(h.terminal(), vec![SessionNotification::End]);
    assert!(h.registry.is_empty());
}

//! On-disk ChangeIndex behaviour: persistence across connections and
//! transactional batches.

use chrono::{TimeZone, Utc};
use mirror_core::{
    config, ChangeIndex, Direction, Outcome, PageId, PageRecord, PageStatus, SyncLogEntry,
};
use rstest::rstest;
use tempfile::TempDir;

fn record(id: &str, status: PageStatus) -> PageRecord {
    let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    PageRecord {
        id: PageId::from(id),
        title: format!("Page {id}"),
        parent_id: None,
        content_hash: format!("hash-{id}"),
        remote_edited_at: t,
        last_synced_at: t,
        status,
    }
}

#[test]
fn records_survive_reopen() {
    let repo = TempDir::new().unwrap();
    let path = config::index_path(repo.path());
    {
        let mut index = ChangeIndex::open(&path).expect("open");
        index
            .apply_batch(&[record("a", PageStatus::Synced), record("b", PageStatus::Synced)], &[])
            .expect("batch");
        index
            .append_log(&SyncLogEntry {
                run_at: Utc::now(),
                direction: Direction::Pull,
                pages_touched: 2,
                outcome: Outcome::Success,
                message: String::new(),
            })
            .expect("log");
    }

    let index = ChangeIndex::open(&path).expect("reopen");
    assert_eq!(index.list_all().unwrap().len(), 2);
    assert_eq!(index.latest_log().unwrap().unwrap().pages_touched, 2);
}

#[test]
fn two_connections_see_each_others_commits() {
    let repo = TempDir::new().unwrap();
    let path = config::index_path(repo.path());
    let mut writer = ChangeIndex::open(&path).unwrap();
    let reader = ChangeIndex::open(&path).unwrap();

    writer.upsert(&record("a", PageStatus::Synced)).unwrap();
    assert!(reader.get(&PageId::from("a")).unwrap().is_some());
}

#[rstest]
#[case(PageStatus::Synced)]
#[case(PageStatus::PendingPush)]
#[case(PageStatus::PendingPull)]
#[case(PageStatus::Conflict)]
#[case(PageStatus::Deleted)]
fn every_status_is_stored_and_listed(#[case] status: PageStatus) {
    let mut index = ChangeIndex::open_in_memory().unwrap();
    index.upsert(&record("x", status)).unwrap();
    let listed = index.list_by_status(status).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, status);
}

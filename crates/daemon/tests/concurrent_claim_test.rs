use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use trackd_core::job::{create_job, JobPriority, JobSource, NewJob};
use trackd_core::prober::Container;
use trackd_core::store::Store;

fn sample_job(container: Container, priority: JobPriority) -> trackd_core::Job {
    create_job(NewJob {
        file_path: "/media/x.mkv".into(),
        container,
        priority,
        source: JobSource::Manual,
        webhook_id: None,
        batch_id: None,
        tmdb_id: None,
        original_language: None,
        series_title: None,
        movie_title: None,
    })
}

/// For any number of concurrent callers racing to dequeue, no two callers
/// ever receive the same job: `claim_next` is one serializable transaction,
/// not a read-then-write race.
#[tokio::test]
async fn no_two_concurrent_claims_return_the_same_job() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(&dir.path().join("jobs.db"), 8).unwrap());

    let job_count = 40;
    for _ in 0..job_count {
        store
            .insert(&sample_job(Container::Mkv, JobPriority::Normal))
            .unwrap();
    }

    let seen = Arc::new(Mutex::new(HashSet::new()));
    let duplicate_found = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        let seen = seen.clone();
        let duplicate_found = duplicate_found.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            while let Ok(Some(job)) = store.claim_next() {
                let mut seen = seen.lock().unwrap();
                if !seen.insert(job.job_id.clone()) {
                    duplicate_found.fetch_add(1, Ordering::SeqCst);
                }
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(duplicate_found.load(Ordering::SeqCst), 0);
    assert_eq!(seen.lock().unwrap().len(), job_count);
}

/// Under concurrent claiming, the number of MP4 jobs ever observed `running`
/// at once never exceeds the configured cap.
#[tokio::test]
async fn mp4_concurrency_cap_holds_under_concurrent_claims() {
    let dir = tempfile::tempdir().unwrap();
    let max_mp4 = 2usize;
    let store = Arc::new(Store::open(&dir.path().join("jobs.db"), max_mp4).unwrap());

    for _ in 0..10 {
        store
            .insert(&sample_job(Container::Mp4, JobPriority::High))
            .unwrap();
    }
    for _ in 0..10 {
        store
            .insert(&sample_job(Container::Mkv, JobPriority::Low))
            .unwrap();
    }

    let max_observed_mp4 = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let max_observed_mp4 = max_observed_mp4.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            loop {
                match store.claim_next() {
                    Ok(Some(_job)) => {
                        let running = store.count_running_for_container(Container::Mp4).unwrap();
                        max_observed_mp4.fetch_max(running as usize, Ordering::SeqCst);
                    }
                    Ok(None) => break,
                    Err(_) => break,
                }
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert!(max_observed_mp4.load(Ordering::SeqCst) <= max_mp4);
}

use super::*;

#[tokio::test]
async fn test_poll_returns_bounded_batches_in_order() {
    let queue = MemoryQueue::new(1);
    let partition = queue.partition(0).unwrap();
    for i in 0..5 {
        partition.produce(None, Some(format!("r{}", i).into_bytes())).await;
    }

    let first = partition.poll_batch(3, Duration::from_millis(10)).await.unwrap();
    let offsets: Vec<i64> = first.iter().map(|r| r.offset).collect();
    assert_eq!(offsets, vec![0, 1, 2]);

    let second = partition.poll_batch(3, Duration::from_millis(10)).await.unwrap();
    let offsets: Vec<i64> = second.iter().map(|r| r.offset).collect();
    assert_eq!(offsets, vec![3, 4]);
}

#[tokio::test]
async fn test_poll_times_out_empty() {
    let queue = MemoryQueue::new(1);
    let partition = queue.partition(0).unwrap();

    let batch = partition.poll_batch(10, Duration::from_millis(20)).await.unwrap();
    assert!(batch.is_empty());
}

#[tokio::test]
async fn test_poll_wakes_on_produce() {
    let queue = MemoryQueue::new(1);
    let partition = queue.partition(0).unwrap();

    let poller = {
        let partition = Arc::clone(&partition);
        tokio::spawn(async move { partition.poll_batch(10, Duration::from_secs(5)).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    partition.produce(None, Some(b"late".to_vec())).await;

    let batch = poller.await.unwrap().unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].payload.as_deref(), Some(&b"late"[..]));
}

#[tokio::test]
async fn test_seek_redelivers() {
    let queue = MemoryQueue::new(1);
    let partition = queue.partition(0).unwrap();
    for _ in 0..3 {
        partition.produce(None, Some(b"x".to_vec())).await;
    }

    partition.poll_batch(10, Duration::from_millis(10)).await.unwrap();
    partition.seek(1).await.unwrap();

    let again = partition.poll_batch(10, Duration::from_millis(10)).await.unwrap();
    assert_eq!(again.first().map(|r| r.offset), Some(1));
    assert!(partition.seek(99).await.is_err());
}

#[tokio::test]
async fn test_reset_to_committed_simulates_restart() {
    let queue = MemoryQueue::new(1);
    let partition = queue.partition(0).unwrap();
    for _ in 0..4 {
        partition.produce(None, Some(b"x".to_vec())).await;
    }

    partition.poll_batch(10, Duration::from_millis(10)).await.unwrap();
    partition.commit(2).await.unwrap();
    partition.reset_to_committed().await;

    assert_eq!(partition.position().await, 2);
    assert_eq!(partition.committed().await, Some(2));
    assert_eq!(partition.commit_history().await, vec![2]);
}

#[tokio::test]
async fn test_same_key_same_partition() {
    let queue = MemoryQueue::new(4);
    let (p1, o1) = queue.produce("dep-1", b"a".to_vec()).await;
    let (p2, o2) = queue.produce("dep-1", b"b".to_vec()).await;

    assert_eq!(p1, p2);
    assert_eq!(o2, o1 + 1);
    assert!(queue.produce_to(7, None).await.is_err());
}

#[tokio::test]
async fn test_partitions_listing() {
    let queue = MemoryQueue::new(3);
    let ids: Vec<i32> = queue
        .partitions()
        .await
        .unwrap()
        .iter()
        .map(|p| p.partition())
        .collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert_eq!(MemoryQueue::new(0).partitions().await.unwrap().len(), 1);
}

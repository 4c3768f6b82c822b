//! Integration tests for playlist ordering
//!
//! Insert, remove and move through the engine, checked against the
//! materialized order and the stored pointers.

mod helpers;

use helpers::*;
use plx_engine::{Error, IntegrityError};
use uuid::Uuid;

async fn three_items(engine: &plx_engine::PlaylistEngine) -> (Uuid, Vec<Uuid>) {
    let playlist = create_playlist(engine, "main").await;
    let a = engine.insert_item(playlist, None, text_item("a")).await.unwrap();
    let b = engine.insert_item(playlist, Some(item_id(&a)), text_item("b")).await.unwrap();
    let c = engine.insert_item(playlist, Some(item_id(&b)), text_item("c")).await.unwrap();
    (playlist, vec![item_id(&a), item_id(&b), item_id(&c)])
}

fn ids(items: &[Uuid]) -> Vec<String> {
    items.iter().map(Uuid::to_string).collect()
}

#[tokio::test]
async fn test_end_to_end_insert_order() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let playlist = create_playlist(&engine, "main").await;

    let item1 = engine.insert_item(playlist, None, text_item("1")).await.unwrap();
    let item2 = engine.insert_item(playlist, Some(item_id(&item1)), text_item("2")).await.unwrap();
    let item3 = engine.insert_item(playlist, None, text_item("3")).await.unwrap();

    assert_eq!(order(&engine, playlist).await, vec![item3.id, item1.id, item2.id]);

    let report = engine.verify_chain(playlist).await.unwrap();
    assert_eq!(report.length, 3);
}

#[tokio::test]
async fn test_empty_playlist_materializes_empty() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let playlist = create_playlist(&engine, "empty").await;

    assert!(engine.materialize(playlist).await.unwrap().is_empty());
    let report = engine.verify_chain(playlist).await.unwrap();
    assert_eq!(report.length, 0);
    assert!(report.head.is_none());
}

#[tokio::test]
async fn test_insert_after_tail_appends() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let (playlist, items) = three_items(&engine).await;

    let d = engine.insert_item(playlist, Some(items[2]), text_item("d")).await.unwrap();

    let mut expected = ids(&items);
    expected.push(d.id.clone());
    assert_eq!(order(&engine, playlist).await, expected);
    assert_eq!(engine.verify_chain(playlist).await.unwrap().tail, Some(d.id));
}

#[tokio::test]
async fn test_insert_in_middle_rewrites_both_neighbours() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let (playlist, items) = three_items(&engine).await;

    let x = engine.insert_item(playlist, Some(items[0]), text_item("x")).await.unwrap();

    let rows = engine.materialize(playlist).await.unwrap();
    assert_eq!(rows[1].id, x.id);
    assert_eq!(rows[0].next_item_id.as_deref(), Some(x.id.as_str()));
    assert_eq!(rows[2].prev_item_id.as_deref(), Some(x.id.as_str()));
}

#[tokio::test]
async fn test_insert_after_unknown_item_changes_nothing() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let (playlist, items) = three_items(&engine).await;

    let ghost = Uuid::new_v4();
    let err = engine.insert_item(playlist, Some(ghost), text_item("x")).await.unwrap_err();

    assert!(matches!(err, Error::ItemNotFound(id) if id == ghost));
    assert_eq!(order(&engine, playlist).await, ids(&items));
    assert_eq!(count_rows(&engine, "widget_configs").await, 3);
}

#[tokio::test]
async fn test_insert_after_item_of_other_playlist_rejected() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let (_, items) = three_items(&engine).await;
    let other = create_playlist(&engine, "other").await;

    let err = engine.insert_item(other, Some(items[0]), text_item("x")).await.unwrap_err();

    assert!(matches!(err, Error::ItemNotFound(_)));
    assert!(order(&engine, other).await.is_empty());
}

#[tokio::test]
async fn test_insert_into_missing_playlist() {
    let (_dir, engine) = create_test_engine().await.unwrap();

    let err = engine.insert_item(Uuid::new_v4(), None, text_item("x")).await.unwrap_err();

    assert!(matches!(err, Error::PlaylistNotFound(_)));
    assert_eq!(count_rows(&engine, "playlist_items").await, 0);
}

#[tokio::test]
async fn test_remove_middle_links_neighbours() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let (playlist, items) = three_items(&engine).await;

    engine.remove_item(playlist, items[1]).await.unwrap();

    let rows = engine.materialize(playlist).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].next_item_id, Some(items[2].to_string()));
    assert_eq!(rows[1].prev_item_id, Some(items[0].to_string()));
    // Config went with the item
    assert_eq!(count_rows(&engine, "widget_configs").await, 2);
}

#[tokio::test]
async fn test_remove_head_and_tail() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let (playlist, items) = three_items(&engine).await;

    engine.remove_item(playlist, items[0]).await.unwrap();
    engine.remove_item(playlist, items[2]).await.unwrap();

    let rows = engine.materialize(playlist).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].prev_item_id, None);
    assert_eq!(rows[0].next_item_id, None);

    engine.remove_item(playlist, items[1]).await.unwrap();
    assert!(order(&engine, playlist).await.is_empty());
}

#[tokio::test]
async fn test_remove_from_wrong_playlist_rejected() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let (playlist, items) = three_items(&engine).await;
    let other = create_playlist(&engine, "other").await;

    let err = engine.remove_item(other, items[0]).await.unwrap_err();

    assert!(matches!(err, Error::ItemNotFound(_)));
    assert_eq!(order(&engine, playlist).await, ids(&items));
}

#[tokio::test]
async fn test_move_to_head() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let (playlist, items) = three_items(&engine).await;

    engine.move_item(items[2], None).await.unwrap();

    assert_eq!(order(&engine, playlist).await, ids(&[items[2], items[0], items[1]]));
    engine.verify_chain(playlist).await.unwrap();
}

#[tokio::test]
async fn test_move_head_to_head_is_noop() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let (playlist, items) = three_items(&engine).await;
    let before = engine.materialize(playlist).await.unwrap();

    engine.move_item(items[0], None).await.unwrap();

    assert_eq!(engine.materialize(playlist).await.unwrap(), before);
}

#[tokio::test]
async fn test_move_onto_itself_is_noop() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let (playlist, items) = three_items(&engine).await;
    let before = engine.materialize(playlist).await.unwrap();

    engine.move_item(items[1], Some(items[1])).await.unwrap();

    assert_eq!(engine.materialize(playlist).await.unwrap(), before);
}

#[tokio::test]
async fn test_move_after_current_predecessor_is_noop() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let (playlist, items) = three_items(&engine).await;
    let before = engine.materialize(playlist).await.unwrap();

    engine.move_item(items[2], Some(items[1])).await.unwrap();

    assert_eq!(engine.materialize(playlist).await.unwrap(), before);
}

#[tokio::test]
async fn test_adjacent_moves() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let (playlist, items) = three_items(&engine).await;
    let (a, b, c) = (items[0], items[1], items[2]);

    // Head after its successor
    engine.move_item(a, Some(b)).await.unwrap();
    assert_eq!(order(&engine, playlist).await, ids(&[b, a, c]));

    // Middle after its successor (the tail)
    engine.move_item(a, Some(c)).await.unwrap();
    assert_eq!(order(&engine, playlist).await, ids(&[b, c, a]));

    // Tail to head
    engine.move_item(a, None).await.unwrap();
    assert_eq!(order(&engine, playlist).await, ids(&[a, b, c]));

    // Across the list
    engine.move_item(a, Some(c)).await.unwrap();
    assert_eq!(order(&engine, playlist).await, ids(&[b, c, a]));

    engine.verify_chain(playlist).await.unwrap();
}

#[tokio::test]
async fn test_move_in_two_item_playlist() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let playlist = create_playlist(&engine, "pair").await;
    let a = item_id(&engine.insert_item(playlist, None, text_item("a")).await.unwrap());
    let b = item_id(&engine.insert_item(playlist, Some(a), text_item("b")).await.unwrap());

    engine.move_item(b, None).await.unwrap();
    assert_eq!(order(&engine, playlist).await, ids(&[b, a]));

    engine.move_item(b, Some(a)).await.unwrap();
    assert_eq!(order(&engine, playlist).await, ids(&[a, b]));
    engine.verify_chain(playlist).await.unwrap();
}

#[tokio::test]
async fn test_move_to_other_playlist_target_rejected() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let (playlist, items) = three_items(&engine).await;
    let other = create_playlist(&engine, "other").await;
    let foreign = item_id(&engine.insert_item(other, None, text_item("f")).await.unwrap());

    let err = engine.move_item(items[0], Some(foreign)).await.unwrap_err();

    assert!(matches!(err, Error::ItemNotFound(id) if id == foreign));
    assert_eq!(order(&engine, playlist).await, ids(&items));
    assert_eq!(order(&engine, other).await, ids(&[foreign]));
}

#[tokio::test]
async fn test_move_unknown_item() {
    let (_dir, engine) = create_test_engine().await.unwrap();

    let err = engine.move_item(Uuid::new_v4(), None).await.unwrap_err();
    assert!(matches!(err, Error::ItemNotFound(_)));
}

#[tokio::test]
async fn test_update_item_timing() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let (playlist, items) = three_items(&engine).await;

    let updated = engine.update_item(items[1], Some(500), None).await.unwrap();
    assert_eq!(updated.offset, 500);
    assert_eq!(updated.duration, 10_000);

    let err = engine.update_item(items[1], None, Some(-1)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTiming(_)));

    // Order untouched
    assert_eq!(order(&engine, playlist).await, ids(&items));
}

#[tokio::test]
async fn test_corrupted_chain_fails_loudly() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let (playlist, items) = three_items(&engine).await;

    // c.next = a closes the chain into a loop
    sqlx::query("UPDATE playlist_items SET next_item_id = ? WHERE id = ?")
        .bind(items[0].to_string())
        .bind(items[2].to_string())
        .execute(engine.pool())
        .await
        .unwrap();

    let err = engine.materialize(playlist).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Integrity {
            kind: IntegrityError::CircularDependency,
            ..
        }
    ));
    assert!(err.to_string().contains("circular dependency detected"));
}

#[tokio::test]
async fn test_asymmetric_pointer_caught_by_verify() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let (playlist, items) = three_items(&engine).await;

    // c.prev = a while b.next = c
    sqlx::query("UPDATE playlist_items SET prev_item_id = ? WHERE id = ?")
        .bind(items[0].to_string())
        .bind(items[2].to_string())
        .execute(engine.pool())
        .await
        .unwrap();

    // Walking next pointers still succeeds
    assert_eq!(order(&engine, playlist).await, ids(&items));

    let err = engine.verify_chain(playlist).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Integrity {
            kind: IntegrityError::InconsistentLink { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_concurrent_inserts_keep_single_chain() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let playlist = create_playlist(&engine, "busy").await;

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..10 {
        let engine = engine.clone();
        tasks.spawn(async move {
            engine
                .insert_item(playlist, None, text_item(&format!("item {}", i)))
                .await
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    let report = engine.verify_chain(playlist).await.unwrap();
    assert_eq!(report.length, 10);
}

#[tokio::test]
async fn test_concurrent_moves_and_removes_keep_single_chain() {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let playlist = create_playlist(&engine, "busy").await;

    let mut items = Vec::new();
    let mut prev = None;
    for i in 0..8 {
        let item = engine
            .insert_item(playlist, prev, text_item(&format!("item {}", i)))
            .await
            .unwrap();
        prev = Some(item_id(&item));
        items.push(item_id(&item));
    }
    let (doomed, survivors) = items.split_at(4);

    let mut tasks = tokio::task::JoinSet::new();
    for (round, &victim) in doomed.iter().enumerate() {
        let remover = engine.clone();
        tasks.spawn(async move { remover.remove_item(playlist, victim).await });

        // Moves only touch survivors, so every call must succeed
        let mover = engine.clone();
        let item = survivors[round];
        let target = if round % 2 == 0 {
            None
        } else {
            Some(survivors[(round + 1) % survivors.len()])
        };
        tasks.spawn(async move { mover.move_item(item, target).await });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    let report = engine.verify_chain(playlist).await.unwrap();
    assert_eq!(report.length, survivors.len());

    let mut remaining = order(&engine, playlist).await;
    remaining.sort();
    let mut expected = ids(survivors);
    expected.sort();
    assert_eq!(remaining, expected);
}

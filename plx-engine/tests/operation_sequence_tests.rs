//! Randomized operation sequences
//!
//! Drives seeded random insert/remove/move sequences against the engine and
//! a `Vec` model, checking after every step that the chain is intact and
//! matches the model.

mod helpers;

use helpers::*;
use plx_engine::PlaylistEngine;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

const STEPS: usize = 60;

/// Pick an item, or `None` (the head position) about one time in four
fn pick_anchor(rng: &mut StdRng, model: &[Uuid]) -> Option<Uuid> {
    if model.is_empty() || rng.gen_ratio(1, 4) {
        None
    } else {
        Some(model[rng.gen_range(0..model.len())])
    }
}

fn insert_into_model(model: &mut Vec<Uuid>, after: Option<Uuid>, item: Uuid) {
    let index = match after {
        Some(anchor) => model.iter().position(|id| *id == anchor).map_or(0, |i| i + 1),
        None => 0,
    };
    model.insert(index, item);
}

async fn check(engine: &PlaylistEngine, playlist: Uuid, model: &[Uuid], step: usize) {
    let report = engine
        .verify_chain(playlist)
        .await
        .unwrap_or_else(|e| panic!("step {}: chain broken: {}", step, e));
    assert_eq!(report.length, model.len(), "step {}", step);

    let expected: Vec<String> = model.iter().map(Uuid::to_string).collect();
    assert_eq!(order(engine, playlist).await, expected, "step {}", step);
}

async fn run_sequence(seed: u64) {
    let (_dir, engine) = create_test_engine().await.unwrap();
    let playlist = create_playlist(&engine, "random").await;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut model: Vec<Uuid> = Vec::new();

    for step in 0..STEPS {
        let roll = rng.gen_range(0..10);

        if model.is_empty() || roll < 4 {
            let after = pick_anchor(&mut rng, &model);
            let item = engine
                .insert_item(playlist, after, text_item(&format!("step {}", step)))
                .await
                .unwrap();
            insert_into_model(&mut model, after, item_id(&item));
        } else if roll < 6 {
            let victim = model.remove(rng.gen_range(0..model.len()));
            engine.remove_item(playlist, victim).await.unwrap();
        } else {
            let item = model[rng.gen_range(0..model.len())];
            let target = pick_anchor(&mut rng, &model);
            engine.move_item(item, target).await.unwrap();

            if target != Some(item) {
                model.retain(|id| *id != item);
                insert_into_model(&mut model, target, item);
            }
        }

        check(&engine, playlist, &model, step).await;
    }
}

#[tokio::test]
async fn test_random_sequences_seed_1() {
    run_sequence(1).await;
}

#[tokio::test]
async fn test_random_sequences_seed_42() {
    run_sequence(42).await;
}

#[tokio::test]
async fn test_random_sequences_seed_2024() {
    run_sequence(2024).await;
}

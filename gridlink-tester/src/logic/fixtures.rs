//! Seeded level catalogues for headless runs.

use gridlink_game::{Cell, Difficulty, Grid, Level, MemoryLevelSource, level_id};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const MIN_SIZE: u32 = 3;
const MAX_SIZE: u32 = 6;

/// Per-level stream so one level never shifts when the catalogue grows.
fn level_rng(seed: u64, number: u32) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed ^ u64::from(number).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

fn difficulty_for(size: u32) -> Difficulty {
    match size {
        0..=3 => Difficulty::Easy,
        4 => Difficulty::Medium,
        5 => Difficulty::Hard,
        _ => Difficulty::Expert,
    }
}

/// Row-by-row boustrophedon walk, randomly mirrored and transposed so
/// levels differ in shape as well as in checkpoints.
fn walk(rng: &mut ChaCha8Rng, size: u32) -> Vec<(u32, u32)> {
    let transpose = rng.gen_bool(0.5);
    let flip_x = rng.gen_bool(0.5);
    let flip_y = rng.gen_bool(0.5);
    let last = size - 1;
    (0..size)
        .flat_map(|row| {
            (0..size).map(move |col| {
                let col = if row % 2 == 0 { col } else { last - col };
                (col, row)
            })
        })
        .map(|(x, y)| if transpose { (y, x) } else { (x, y) })
        .map(|(x, y)| {
            (
                if flip_x { last - x } else { x },
                if flip_y { last - y } else { y },
            )
        })
        .collect()
}

/// Build level `number` for `seed`. The stored solution always validates.
#[must_use]
pub fn generate_level(seed: u64, number: u32) -> Level {
    let mut rng = level_rng(seed, number);
    let size = rng.gen_range(MIN_SIZE..=MAX_SIZE);
    let path = walk(&mut rng, size);
    let last = path.len() - 1;

    let mut interior: Vec<usize> = (1..last).collect();
    interior.shuffle(&mut rng);
    let extra = rng.gen_range(1..=(size as usize));
    let mut checkpoints: Vec<usize> = interior.into_iter().take(extra).collect();
    checkpoints.push(0);
    checkpoints.push(last);
    checkpoints.sort_unstable();

    let mut grid: Grid = (0..size)
        .map(|y| (0..size).map(|x| Cell::blank(x, y)).collect())
        .collect();
    for (value, &index) in (1u32..).zip(&checkpoints) {
        let (x, y) = path[index];
        grid[y as usize][x as usize].value = Some(value);
    }
    let solution = path
        .iter()
        .map(|&(x, y)| grid[y as usize][x as usize])
        .collect();

    Level {
        id: level_id(number),
        difficulty: difficulty_for(size),
        grid_size: size,
        grid,
        solution,
    }
}

/// Remote level store holding levels `1..=count` for `seed`.
#[must_use]
pub fn catalogue(seed: u64, count: u32) -> MemoryLevelSource {
    MemoryLevelSource::with_levels((1..=count).map(|n| (n, generate_level(seed, n))))
}

/// A wrong attempt: the solution walked backwards, which starts on the final
/// checkpoint instead of 1.
#[must_use]
pub fn botched_path(level: &Level) -> Vec<Cell> {
    level.solution.iter().rev().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridlink_game::validate_path;

    #[test]
    fn generated_levels_are_well_formed_and_solvable() {
        for seed in [1, 42, 1337] {
            for number in 1..=25 {
                let level = generate_level(seed, number);
                assert!(level.validate_shape(), "{}", level.id);
                assert!(level.has_valid_solution(), "{}", level.id);
                assert!(level.max_value().unwrap_or(0) >= 2);
            }
        }
    }

    #[test]
    fn generation_is_deterministic_per_seed() {
        assert_eq!(generate_level(7, 3), generate_level(7, 3));
        let differs = (1..=10).any(|n| generate_level(7, n) != generate_level(8, n));
        assert!(differs);
    }

    #[test]
    fn botched_paths_never_validate() {
        for number in 1..=20 {
            let level = generate_level(99, number);
            assert!(!validate_path(&level.grid, &botched_path(&level)));
        }
    }

    #[tokio::test]
    async fn catalogue_serves_every_level() {
        use gridlink_game::LevelSource;
        let source = catalogue(5, 12);
        assert_eq!(source.max_level_number().await.unwrap(), 12);
        let level = source.level_by_number(12).await.unwrap().unwrap();
        assert_eq!(level.id, "level_12");
    }
}

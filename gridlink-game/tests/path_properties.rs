use std::collections::HashSet;

use gridlink_game::{Cell, Grid, validate_path};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Boustrophedon walk over an `n` x `n` grid.
fn serpentine(n: u32) -> Vec<(u32, u32)> {
    (0..n)
        .flat_map(|y| {
            let row: Vec<u32> = if y % 2 == 0 {
                (0..n).collect()
            } else {
                (0..n).rev().collect()
            };
            row.into_iter().map(move |x| (x, y))
        })
        .collect()
}

/// Grid whose checkpoints lie along the serpentine walk, with the walk as
/// its solution.
fn puzzle(rng: &mut ChaCha8Rng, n: u32) -> (Grid, Vec<Cell>) {
    let walk = serpentine(n);
    let last = walk.len() - 1;
    let mut checkpoints = vec![0];
    if last > 0 {
        let mut middle: Vec<usize> = (1..last).collect();
        middle.shuffle(rng);
        let extra = rng.gen_range(0..=middle.len().min(4));
        let mut chosen: Vec<usize> = middle.into_iter().take(extra).collect();
        chosen.sort_unstable();
        checkpoints.extend(chosen);
        checkpoints.push(last);
    }

    let size = usize::try_from(n).unwrap();
    let mut grid: Grid = (0..n)
        .map(|y| (0..n).map(|x| Cell::blank(x, y)).collect())
        .collect();
    for (value, &index) in checkpoints.iter().enumerate() {
        let (x, y) = walk[index];
        grid[y as usize][x as usize].value = Some(u32::try_from(value).unwrap() + 1);
    }
    assert_eq!(grid.len(), size);

    let solution = walk
        .iter()
        .map(|&(x, y)| grid[y as usize][x as usize])
        .collect();
    (grid, solution)
}

/// Independent statement of what a winning path is.
fn is_winning(grid: &Grid, path: &[Cell]) -> bool {
    let n = grid.len();
    if path.is_empty() || path.len() != n * n {
        return false;
    }
    let distinct: HashSet<(u32, u32)> = path.iter().map(Cell::position).collect();
    if distinct.len() != path.len() {
        return false;
    }
    let max = grid.iter().flatten().filter_map(|c| c.value).max();
    let numbered: Vec<u32> = path.iter().filter_map(|c| c.value).collect();
    let in_order = numbered.iter().copied().eq(1..=max.unwrap_or(0));
    path[0].value == Some(1)
        && path[path.len() - 1].value == max
        && in_order
        && path.windows(2).all(|pair| pair[0].is_adjacent(&pair[1]))
}

#[test]
fn authored_solutions_are_accepted() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x00C0_FFEE);
    for n in 1..=6 {
        for _ in 0..20 {
            let (grid, solution) = puzzle(&mut rng, n);
            assert!(validate_path(&grid, &solution), "n={n}: {solution:?}");
        }
    }
}

#[test]
fn validator_agrees_with_definition_on_perturbed_paths() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut accepted = 0;
    let mut rejected = 0;
    for _ in 0..400 {
        let n = rng.gen_range(1..=5);
        let (grid, solution) = puzzle(&mut rng, n);
        let mut path = solution.clone();
        match rng.gen_range(0..4) {
            0 => {}
            1 => path.shuffle(&mut rng),
            2 if path.len() > 1 => {
                let i = rng.gen_range(0..path.len());
                let j = rng.gen_range(0..path.len());
                path.swap(i, j);
            }
            3 => path.reverse(),
            _ => {
                path.pop();
            }
        }
        let expected = is_winning(&grid, &path);
        assert_eq!(validate_path(&grid, &path), expected, "n={n}: {path:?}");
        if expected {
            accepted += 1;
        } else {
            rejected += 1;
        }
    }
    assert!(accepted > 0 && rejected > 0);
}

#[test]
fn duplicates_short_and_empty_paths_are_rejected() {
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    for n in 2..=5 {
        let (grid, solution) = puzzle(&mut rng, n);
        assert!(!validate_path(&grid, &[]));
        assert!(!validate_path(&grid, &solution[..solution.len() - 1]));

        let mut duplicated = solution.clone();
        let last = duplicated.len() - 1;
        duplicated[last] = duplicated[0];
        assert!(!validate_path(&grid, &duplicated));
    }
}

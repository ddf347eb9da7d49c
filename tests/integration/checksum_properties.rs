//! Properties of the input checksum over arbitrary file sets.

use anvil::idempotency::compute_input_checksum;
use proptest::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_inputs(dir: &TempDir, contents: &[Vec<u8>]) -> Vec<PathBuf> {
    contents
        .iter()
        .enumerate()
        .map(|(i, bytes)| {
            let path = dir.path().join(format!("input-{i}.txt"));
            fs::write(&path, bytes).unwrap();
            path
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn secondary_order_does_not_matter(
        contents in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..6),
        seed in any::<u64>(),
    ) {
        let dir = TempDir::new().unwrap();
        let paths = write_inputs(&dir, &contents);
        let mut shuffled = paths.clone();
        let len = shuffled.len();
        shuffled.rotate_left((seed as usize) % len);
        shuffled.reverse();

        let a = compute_input_checksum(None, &paths).unwrap();
        let b = compute_input_checksum(None, &shuffled).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn any_byte_change_changes_the_checksum(
        contents in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..64), 1..4),
        which in any::<prop::sample::Index>(),
        position in any::<prop::sample::Index>(),
    ) {
        let dir = TempDir::new().unwrap();
        let paths = write_inputs(&dir, &contents);
        let before = compute_input_checksum(Some(paths[0].as_path()), &paths[1..]).unwrap();
        prop_assert_eq!(&before, &compute_input_checksum(Some(paths[0].as_path()), &paths[1..]).unwrap());

        let file = which.index(contents.len());
        let mut changed = contents[file].clone();
        let at = position.index(changed.len());
        changed[at] = changed[at].wrapping_add(1);
        fs::write(&paths[file], &changed).unwrap();

        let after = compute_input_checksum(Some(paths[0].as_path()), &paths[1..]).unwrap();
        prop_assert_ne!(before, after);
    }
}

#[test]
fn primary_and_secondary_roles_are_distinguished() {
    let dir = TempDir::new().unwrap();
    let paths = write_inputs(&dir, &[b"same".to_vec()]);

    let as_primary = compute_input_checksum(Some(paths[0].as_path()), &[]).unwrap();
    let as_secondary = compute_input_checksum(None, &paths).unwrap();
    assert_ne!(as_primary, as_secondary);
}

#[test]
fn missing_input_is_an_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("gone.md");
    assert!(compute_input_checksum(Some(missing.as_path()), &[]).is_err());
    assert!(compute_input_checksum(None, &[missing]).is_err());
}

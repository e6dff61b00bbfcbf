//! Integration tests for staging and the result cache
//!
//! These tests verify:
//! - Staged trees keep the relative layout of the source tree
//! - Only complete earlier preparations are registered
//! - Reuse needs byte-identical content

mod common;

use camino::Utf8PathBuf;
use common::{create_project, utf8_tempdir};
use cppstats_prepare::PreparationKind;
use cppstats_prepare::services::{Materializer, ResultCache, source_tree, stage_tree};
use std::fs;

#[test]
fn test_staged_tree_preserves_relative_paths() {
    let (_dir, root) = utf8_tempdir();
    let project = create_project(
        &root,
        "demo",
        &[
            ("a.c", "a"),
            ("lib/b.H", "b"),
            ("lib/deep/c.C", "c"),
            ("lib/readme.md", "not a source"),
            (".git/d.c", "ignored"),
        ],
    );
    let source = project.join("source");
    let dest = project.join("_cppstats");

    stage_tree(
        &source,
        &dest,
        false,
        &ResultCache::new(),
        PreparationKind::General,
        &Materializer::default(),
    )
    .unwrap();

    let relative = |root: &camino::Utf8Path| -> Vec<Utf8PathBuf> {
        source_tree::source_files(root)
            .unwrap()
            .iter()
            .map(|file| source_tree::relative_name(file, root))
            .collect()
    };

    assert_eq!(relative(&dest), relative(&source));
    assert_eq!(
        relative(&dest),
        vec![
            Utf8PathBuf::from("a.c"),
            Utf8PathBuf::from("lib/b.H"),
            Utf8PathBuf::from("lib/deep/c.C"),
        ]
    );
    assert!(!dest.join(".git").exists());
}

#[test]
fn test_cache_registers_complete_preparations_only() {
    let (_dir, root) = utf8_tempdir();
    let done = create_project(&root, "done", &[("a.c", "a"), ("b.c", "b")]);
    fs::create_dir_all(done.join("_cppstats")).unwrap();
    fs::write(done.join("_cppstats/a.c"), "prepared a").unwrap();
    fs::write(done.join("_cppstats/a.c.xml"), "<unit/>").unwrap();
    // b.c was staged but never finished.
    fs::write(done.join("_cppstats/b.c"), "prepared b").unwrap();

    // Never prepared with this kind.
    let fresh = create_project(&root, "fresh", &[("a.c", "a")]);

    let cache = ResultCache::build(&[done.clone(), fresh], PreparationKind::General).unwrap();

    assert_eq!(cache.len(), 1);
    let candidates = cache.candidates("a.c".as_ref());
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].original, done.join("source/a.c"));
    assert_eq!(candidates[0].result, done.join("_cppstats/a.c.xml"));
    assert!(cache.candidates("b.c".as_ref()).is_empty());
}

#[test]
fn test_cache_is_per_kind() {
    let (_dir, root) = utf8_tempdir();
    let done = create_project(&root, "done", &[("a.c", "a")]);
    fs::create_dir_all(done.join("_cppstats")).unwrap();
    fs::write(done.join("_cppstats/a.c"), "prepared a").unwrap();
    fs::write(done.join("_cppstats/a.c.xml"), "<unit/>").unwrap();

    let cache = ResultCache::build(&[done], PreparationKind::Discipline).unwrap();
    assert!(cache.is_empty());
}

#[test]
fn test_lazy_staging_reuses_identical_file() {
    let (_dir, root) = utf8_tempdir();
    let done = create_project(&root, "done", &[("a.c", "same\n"), ("b.c", "old\n")]);
    let prepared = done.join("_cppstats_pretty");
    fs::create_dir_all(&prepared).unwrap();
    fs::write(prepared.join("a.c"), "pretty a\n").unwrap();
    fs::write(prepared.join("b.c"), "pretty b\n").unwrap();

    let next = create_project(&root, "next", &[("a.c", "same\n"), ("b.c", "new\n")]);
    let cache = ResultCache::build(&[done], PreparationKind::Pretty).unwrap();

    let report = stage_tree(
        &next.join("source"),
        &next.join("_cppstats_pretty"),
        true,
        &cache,
        PreparationKind::Pretty,
        &Materializer::copying(),
    )
    .unwrap();

    assert!(report.was_reused("a.c".as_ref()));
    assert!(!report.was_reused("b.c".as_ref()));
    assert_eq!(report.copied, vec![Utf8PathBuf::from("b.c")]);
    assert_eq!(
        fs::read_to_string(next.join("_cppstats_pretty/a.c")).unwrap(),
        "pretty a\n"
    );
    assert_eq!(
        fs::read_to_string(next.join("_cppstats_pretty/b.c")).unwrap(),
        "new\n"
    );
}

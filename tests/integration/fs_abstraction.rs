// tests/integration/fs_abstraction.rs

use std::path::{Path, PathBuf};

use assetdag::fs::mock::MockFileSystem;
use assetdag::fs::{FileSystem, RealFileSystem};
use assetdag::watch::{collect_matching_files, PathMatcher};
use assetdag_test_utils::write_file;

fn globs(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn mock_tree_discovery_honours_excludes() {
    let fs = MockFileSystem::new();
    fs.add_file("site/src/SCSS/main.scss");
    fs.add_file("site/src/SCSS/_partials/_vars.scss");
    fs.add_file("site/src/SCSS/old.scss.tmp");
    fs.add_file("site/src/js/app.js");

    let matcher = PathMatcher::new(&globs(&["src/SCSS/**/*.scss"]), &globs(&["**/_*.scss"])).unwrap();
    let found = collect_matching_files(&fs, Path::new("site"), &matcher).unwrap();

    assert_eq!(found, vec![PathBuf::from("src/SCSS/main.scss")]);
}

#[test]
fn real_and_mock_filesystems_agree() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockFileSystem::new();
    for rel in ["src/img/logo.png", "src/img/icons/a.svg", "src/index.html"] {
        write_file(dir.path(), rel, "x");
        mock.add_file(dir.path().join(rel));
    }

    let matcher = PathMatcher::new(&globs(&["src/img/**/*"]), &[]).unwrap();
    let real = collect_matching_files(&RealFileSystem, dir.path(), &matcher).unwrap();
    let mocked = collect_matching_files(&mock, dir.path(), &matcher).unwrap();

    assert_eq!(real, mocked);
    assert_eq!(
        real,
        vec![PathBuf::from("src/img/icons/a.svg"), PathBuf::from("src/img/logo.png")]
    );
    assert!(RealFileSystem.is_dir(&dir.path().join("src/img")));
}

#[test]
fn missing_source_directory_yields_no_files() {
    let fs = MockFileSystem::new();
    let matcher = PathMatcher::new(&globs(&["src/js/**/*.js"]), &[]).unwrap();
    let found = collect_matching_files(&fs, Path::new("proj"), &matcher).unwrap();
    assert!(found.is_empty());
}

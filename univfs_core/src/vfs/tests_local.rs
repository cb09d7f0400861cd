#[cfg(test)]
mod tests {
    use crate::factory::FileFactory;
    use crate::file::{same_instance, AbstractFile, FileKind, FileRef, FileRefExt};
    use crate::ops::FileOps;
    use crate::vfs::LocalFile;
    use std::fs;
    use std::io::{Read, Write};
    use std::path::Path;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;
    use univfs_common::{FileUrl, TransferReason, VfsError};

    fn factory() -> FileFactory {
        FileFactory::with_defaults().expect("Failed to build factory")
    }

    fn resolve(factory: &FileFactory, path: &Path) -> FileRef {
        factory
            .resolve(&FileUrl::from_local_path(path), None)
            .expect("Failed to resolve")
    }

    fn read_all(file: &dyn AbstractFile) -> String {
        let mut content = String::new();
        file.input_stream()
            .expect("Failed to open")
            .read_to_string(&mut content)
            .expect("Failed to read");
        content
    }

    // ============================================================================
    // Resolution
    // ============================================================================

    #[test]
    fn test_resolve_plain_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("plain.txt"), b"hello").unwrap();

        let factory = factory();
        let file = resolve(&factory, &temp_dir.path().join("plain.txt"));
        assert_eq!(file.kind(), FileKind::Raw);
        assert!(file.exists());
        assert!(!file.is_directory());
        assert!(!file.is_archive());
        assert_eq!(file.size(), Some(5));
        assert_eq!(file.name(), "plain.txt");
        assert!(same_instance(&file.top_ancestor(), &file));
        assert_eq!(file.archive_boundaries(), 0);
    }

    #[test]
    fn test_resolve_by_string_and_trailing_separator() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let dir = temp_dir.path().join("folder");
        fs::create_dir(&dir).unwrap();

        let factory = factory();
        let text = dir.to_string_lossy().to_string();
        let first = factory.get_file(&text).unwrap();
        let second = factory
            .get_file(&format!("{}{}", text, std::path::MAIN_SEPARATOR))
            .unwrap();
        assert!(first.is_directory());
        assert!(same_instance(&first, &second));
    }

    #[test]
    fn test_missing_file_resolves_but_does_not_exist() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let factory = factory();
        let file = resolve(&factory, &temp_dir.path().join("nothing-here"));
        assert!(!file.exists());
        assert_eq!(file.size(), None);
        assert!(matches!(file.input_stream(), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn test_explicit_parent_is_attached() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("child.txt"), b"x").unwrap();

        let factory = factory();
        let parent = resolve(&factory, temp_dir.path());
        let child = factory
            .resolve(
                &FileUrl::from_local_path(&temp_dir.path().join("child.txt")),
                Some(parent.clone()),
            )
            .unwrap();
        assert!(same_instance(&child.parent().unwrap().unwrap(), &parent));
    }

    #[test]
    fn test_lazy_parent() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let file = LocalFile::new(&temp_dir.path().join("a.txt"));
        let parent = file.parent().unwrap().expect("Parent expected");
        assert_eq!(*parent.url(), FileUrl::from_local_path(temp_dir.path()));
        assert!(parent.is_directory());

        let root = LocalFile::new(Path::new("/"));
        assert!(root.parent().unwrap().is_none());
    }

    // ============================================================================
    // Listing and streams
    // ============================================================================

    #[test]
    fn test_ls_is_sorted_and_sets_parent() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("b.txt"), b"b").unwrap();
        fs::write(temp_dir.path().join("a.txt"), b"a").unwrap();
        fs::create_dir(temp_dir.path().join("c")).unwrap();

        let factory = factory();
        let dir = resolve(&factory, temp_dir.path());
        let children = factory.ls(&dir).unwrap();
        let names: Vec<String> = children.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c"]);
        for child in &children {
            assert!(same_instance(&child.parent().unwrap().unwrap(), &dir));
        }
    }

    #[test]
    fn test_ls_on_file_fails() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("file.txt");
        fs::write(&path, b"x").unwrap();
        assert!(matches!(
            LocalFile::new(&path).ls(),
            Err(VfsError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_write_append_and_read() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let file = LocalFile::new(&temp_dir.path().join("log.txt"));

        let mut out = file.output_stream().unwrap();
        out.write_all(b"first\n").unwrap();
        out.close().unwrap();

        let mut out = file.append_stream().unwrap();
        out.write_all(b"second\n").unwrap();
        out.close().unwrap();

        assert_eq!(read_all(&file), "first\nsecond\n");
    }

    #[test]
    fn test_random_access_input() {
        use std::io::{Seek, SeekFrom};

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("data.bin");
        fs::write(&path, b"0123456789").unwrap();

        let mut input = LocalFile::new(&path).random_access_input().unwrap();
        assert_eq!(input.length().unwrap(), 10);
        input.seek(SeekFrom::Start(6)).unwrap();
        let mut tail = String::new();
        input.read_to_string(&mut tail).unwrap();
        assert_eq!(tail, "6789");
    }

    #[test]
    fn test_mkdir_child_and_delete() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let dir = LocalFile::new(&temp_dir.path().join("made"));
        dir.mkdir().unwrap();
        assert!(dir.is_directory());
        assert!(matches!(dir.mkdir(), Err(VfsError::AlreadyExists(_))));

        let child = dir.child("inner.txt").unwrap();
        assert_eq!(child.name(), "inner.txt");
        assert!(!child.exists());

        dir.delete().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_delete_non_empty_directory_error_names_path() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let dir = temp_dir.path().join("full");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("kept.txt"), b"k").unwrap();

        let err = LocalFile::new(&dir).delete().unwrap_err();
        assert!(
            err.to_string().contains(&dir.display().to_string()),
            "error should name {}: {}",
            dir.display(),
            err
        );
        assert!(dir.join("kept.txt").exists());
    }

    #[test]
    fn test_change_date() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("dated.txt");
        fs::write(&path, b"x").unwrap();

        let file = LocalFile::new(&path);
        let date = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000);
        file.change_date(date).unwrap();
        assert_eq!(file.last_modified(), date);
    }

    #[test]
    fn test_hidden_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        assert!(LocalFile::new(&temp_dir.path().join(".profile")).is_hidden());
        assert!(!LocalFile::new(&temp_dir.path().join("profile")).is_hidden());
    }

    // ============================================================================
    // Permissions
    // ============================================================================

    #[cfg(unix)]
    #[test]
    fn test_unix_permissions() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("script.sh");
        fs::write(&path, b"#!/bin/sh\n").unwrap();

        let file = LocalFile::new(&path);
        assert_eq!(file.changeable_permissions(), 0o777);

        file.change_permissions(0o750).unwrap();
        assert_eq!(file.permissions().value(), 0o750);
        assert_eq!(file.permissions_string(), "-rwxr-x---");

        file.change_permission(
            univfs_common::PermissionAccess::Other,
            univfs_common::PermissionType::Read,
            true,
        )
        .unwrap();
        assert_eq!(file.permissions().value(), 0o754);
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_permission_string() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let dir = LocalFile::new(&temp_dir.path().join("d"));
        dir.mkdir().unwrap();
        dir.change_permissions(0o755).unwrap();
        assert_eq!(dir.permissions_string(), "drwxr-xr-x");
    }

    // ============================================================================
    // Copy, move, delete
    // ============================================================================

    #[test]
    fn test_copy_tree() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let source = temp_dir.path().join("src");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::write(source.join("a.txt"), b"alpha").unwrap();
        fs::write(source.join("sub").join("b.txt"), b"beta").unwrap();

        let dest = temp_dir.path().join("dst");
        LocalFile::new(&source)
            .copy_to(&LocalFile::new(&dest))
            .expect("Copy failed");

        assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"alpha");
        assert_eq!(fs::read(dest.join("sub").join("b.txt")).unwrap(), b"beta");
        assert!(source.join("a.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_skips_symlinks() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let source = temp_dir.path().join("src");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("real.txt"), b"real").unwrap();
        std::os::unix::fs::symlink(source.join("real.txt"), source.join("link.txt")).unwrap();

        let dest = temp_dir.path().join("dst");
        LocalFile::new(&source).copy_to(&LocalFile::new(&dest)).unwrap();
        assert!(dest.join("real.txt").exists());
        assert!(!dest.join("link.txt").exists());
    }

    #[test]
    fn test_move_renames() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let source = temp_dir.path().join("old.txt");
        fs::write(&source, b"payload").unwrap();
        let dest = temp_dir.path().join("new.txt");

        LocalFile::new(&source).move_to(&LocalFile::new(&dest)).unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn test_move_onto_itself_is_rejected() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("same.txt");
        fs::write(&path, b"x").unwrap();

        let err = LocalFile::new(&path)
            .move_to(&LocalFile::new(&path))
            .unwrap_err();
        assert_eq!(
            err.transfer_reason(),
            Some(TransferReason::SourceAndDestinationIdentical)
        );
        assert!(path.exists());
    }

    #[test]
    fn test_delete_recursively() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join("tree");
        fs::create_dir_all(root.join("a").join("b")).unwrap();
        fs::write(root.join("a").join("b").join("c.txt"), b"c").unwrap();
        fs::write(root.join("top.txt"), b"t").unwrap();

        LocalFile::new(&root).delete_recursively().unwrap();
        assert!(!root.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_delete_recursively_does_not_follow_symlinked_dirs() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let kept = temp_dir.path().join("kept");
        fs::create_dir(&kept).unwrap();
        fs::write(kept.join("keep.txt"), b"k").unwrap();

        let root = temp_dir.path().join("root");
        fs::create_dir(&root).unwrap();
        std::os::unix::fs::symlink(&kept, root.join("link")).unwrap();

        LocalFile::new(&root).delete_recursively().unwrap();
        assert!(!root.exists());
        assert!(kept.join("keep.txt").exists());
    }

    #[test]
    fn test_is_same_file_uses_canonical_paths() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir(temp_dir.path().join("d")).unwrap();
        fs::write(temp_dir.path().join("f.txt"), b"x").unwrap();

        let direct = LocalFile::new(&temp_dir.path().join("f.txt"));
        let dotted = LocalFile::from_parts(
            FileUrl::from_local_path(&temp_dir.path().join("f.txt")),
            temp_dir.path().join("d").join("..").join("f.txt"),
        );
        assert!(direct.is_same_file(&dotted));
    }
}

#[cfg(test)]
mod tests {
    use crate::factory::FileFactory;
    use crate::file::{same_instance, AbstractFile, FileKind, FileRef, FileRefExt};
    use crate::ops::{ChecksumAlgorithm, FileOps};
    use crate::vfs::LocalFile;
    use std::fs;
    use std::io::{Cursor, Read, Write};
    use std::path::Path;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;
    use univfs_common::{FileUrl, VfsError};
    use zip::write::FileOptions;

    fn factory() -> FileFactory {
        FileFactory::with_defaults().expect("Failed to build factory")
    }

    fn resolve(factory: &FileFactory, path: &Path) -> FileRef {
        factory
            .resolve(&FileUrl::from_local_path(path), None)
            .expect("Failed to resolve")
    }

    fn read_all(file: &FileRef) -> String {
        let mut content = String::new();
        file.input_stream()
            .expect("Failed to open entry")
            .read_to_string(&mut content)
            .expect("Failed to read entry");
        content
    }

    fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            writer
                .start_file(*name, FileOptions::default())
                .expect("Failed to start zip entry");
            writer.write_all(data).expect("Failed to write zip entry");
        }
        writer.finish().expect("Failed to finish zip").into_inner()
    }

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let files: Vec<(&str, &[u8])> = files.iter().map(|(n, d)| (*n, d.as_bytes())).collect();
        fs::write(path, zip_bytes(&files)).expect("Failed to write zip");
    }

    /// Single stored entry whose central record declares `declared` bytes
    /// through a zip64 extra field
    fn zip_with_declared_size(name: &str, data: &[u8], declared: u64) -> Vec<u8> {
        let mut crc = flate2::Crc::new();
        crc.update(data);
        let crc = crc.sum();
        let size = data.len() as u32;
        let name_len = name.len() as u16;

        let mut out = Vec::new();
        out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
        out.extend_from_slice(&[20, 0, 0, 0, 0, 0, 0, 0, 0x21, 0]);
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(data);

        let central_offset = out.len() as u32;
        out.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
        out.extend_from_slice(&[20, 0, 20, 0, 0, 0, 0, 0, 0, 0, 0x21, 0]);
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(&12u16.to_le_bytes());
        out.extend_from_slice(&[0; 14]);
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&8u16.to_le_bytes());
        out.extend_from_slice(&declared.to_le_bytes());
        let central_size = out.len() as u32 - central_offset;

        out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
        out.extend_from_slice(&[0, 0, 0, 0, 1, 0, 1, 0]);
        out.extend_from_slice(&central_size.to_le_bytes());
        out.extend_from_slice(&central_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    fn write_tar_gz(path: &Path, files: &[(&str, &str, u32)]) {
        let file = fs::File::create(path).expect("Failed to create tar.gz");
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data, mode) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_mtime(1_600_000_000);
            header.set_cksum();
            builder
                .append_data(&mut header, name, data.as_bytes())
                .expect("Failed to append tar entry");
        }
        builder
            .into_inner()
            .expect("Failed to finish tar")
            .finish()
            .expect("Failed to finish gzip");
    }

    // ============================================================================
    // Zip
    // ============================================================================

    #[test]
    fn test_resolve_entry_in_zip() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp_dir.path().join("a.zip");
        write_zip(&zip_path, &[("inner/file.txt", "hello")]);

        let factory = factory();
        let entry = resolve(&factory, &zip_path.join("inner").join("file.txt"));

        assert_eq!(entry.kind(), FileKind::ArchiveEntry);
        assert!(entry.exists());
        assert_eq!(entry.size(), Some(5));
        assert_eq!(read_all(&entry), "hello");
        assert_eq!(entry.archive_boundaries(), 1);

        let top = entry.top_ancestor();
        assert_eq!(top.kind(), FileKind::Raw);
        assert_eq!(*top.url(), FileUrl::from_local_path(&zip_path));

        let archive = entry.parent_archive().expect("Entry should have an archive");
        assert!(archive.is_archive());
        assert!(entry.has_ancestor_of_kind(FileKind::ArchiveRoot));
    }

    #[test]
    fn test_repeated_resolve_returns_same_instance() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp_dir.path().join("a.zip");
        write_zip(&zip_path, &[("file.txt", "x")]);

        let factory = factory();
        let first = resolve(&factory, &zip_path.join("file.txt"));
        let second = resolve(&factory, &zip_path.join("file.txt"));
        assert!(same_instance(&first, &second));

        let archive = resolve(&factory, &zip_path);
        assert!(same_instance(&archive, &first.parent_archive().unwrap()));
    }

    #[test]
    fn test_archive_named_directory_inside_archive_is_not_pooled() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp_dir.path().join("outer.zip");
        write_zip(&zip_path, &[("nested.zip/inner.txt", "inner")]);

        let factory = factory();
        let entry = resolve(&factory, &zip_path.join("nested.zip").join("inner.txt"));
        assert_eq!(read_all(&entry), "inner");
        assert_eq!(entry.archive_boundaries(), 1);

        // the archive and the final entry only
        let pool = factory.pool("file").expect("file pool");
        assert_eq!(pool.len(), 2, "Intermediate entries should not be pooled");
    }

    #[test]
    fn test_archive_listing_has_implicit_directories() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp_dir.path().join("listing.zip");
        write_zip(
            &zip_path,
            &[("top.txt", "t"), ("inner/deep/file.txt", "f")],
        );

        let factory = factory();
        let archive = resolve(&factory, &zip_path);
        assert!(archive.is_archive());
        assert!(archive.is_browsable());
        assert!(!archive.is_directory());

        let children = factory.ls(&archive).unwrap();
        let names: Vec<String> = children.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["inner", "top.txt"]);

        let inner = &children[0];
        assert!(inner.is_directory(), "Implicit directory expected");
        let deep = inner.ls().unwrap();
        assert_eq!(deep.len(), 1);
        assert_eq!(deep[0].name(), "deep");
        assert!(same_instance(&inner.parent().unwrap().unwrap(), &archive));
    }

    #[test]
    fn test_entry_parent_chain() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp_dir.path().join("chain.zip");
        write_zip(&zip_path, &[("a/b.txt", "b")]);

        let entry = resolve(&factory(), &zip_path.join("a").join("b.txt"));
        let parent = entry.parent().unwrap().unwrap();
        assert_eq!(parent.name(), "a");
        assert!(parent.is_directory());
        let archive = parent.parent().unwrap().unwrap();
        assert!(archive.is_archive());
    }

    #[test]
    fn test_missing_entry_does_not_exist() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp_dir.path().join("a.zip");
        write_zip(&zip_path, &[("file.txt", "x")]);

        let entry = resolve(&factory(), &zip_path.join("nope.txt"));
        assert!(!entry.exists());
        assert!(matches!(entry.input_stream(), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn test_entries_are_read_only() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp_dir.path().join("a.zip");
        write_zip(&zip_path, &[("file.txt", "x")]);

        let entry = resolve(&factory(), &zip_path.join("file.txt"));
        assert!(!entry.capabilities().write);
        assert!(matches!(entry.output_stream(), Err(e) if e.is_unsupported()));
        assert!(entry.delete().unwrap_err().is_unsupported());
        assert_eq!(entry.permissions_string(), "-rw-r--r--");
    }

    #[test]
    fn test_oversized_declared_entry_size_does_not_abort_read() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp_dir.path().join("inflated.zip");
        fs::write(
            &zip_path,
            zip_with_declared_size("a.txt", b"eighteen bytes ok!", u64::MAX - 16),
        )
        .expect("Failed to write zip");

        let entry = resolve(&factory(), &zip_path.join("a.txt"));
        assert!(entry.exists());
        assert_eq!(entry.size(), Some(u64::MAX - 16));

        match entry.input_stream() {
            Ok(mut input) => {
                let mut content = Vec::new();
                input.read_to_end(&mut content).expect("Failed to read entry");
                assert_eq!(content, b"eighteen bytes ok!");
            }
            Err(e) => assert!(
                matches!(e, VfsError::Archive { .. }),
                "Expected an archive error, got {e}"
            ),
        }
    }

    #[test]
    fn test_archive_names_match_case_insensitively() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp_dir.path().join("DATA.ZIP");
        write_zip(&zip_path, &[("file.txt", "upper")]);

        let entry = resolve(&factory(), &zip_path.join("file.txt"));
        assert_eq!(read_all(&entry), "upper");
    }

    #[test]
    fn test_nested_archive() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let inner = zip_bytes(&[("deep.txt", "nested content".as_bytes())]);
        let outer_path = temp_dir.path().join("outer.zip");
        fs::write(&outer_path, zip_bytes(&[("nested/inner.zip", inner.as_slice())])).unwrap();

        let factory = factory();
        let deep = resolve(
            &factory,
            &outer_path.join("nested").join("inner.zip").join("deep.txt"),
        );
        assert_eq!(read_all(&deep), "nested content");
        assert_eq!(deep.archive_boundaries(), 2);
        assert_eq!(
            *deep.top_ancestor().url(),
            FileUrl::from_local_path(&outer_path)
        );

        let inner_archive = deep.parent_archive().unwrap();
        assert_eq!(inner_archive.name(), "inner.zip");
        assert_eq!(inner_archive.archive_boundaries(), 2);
    }

    #[test]
    fn test_directory_named_like_archive_is_not_wrapped() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let dir = temp_dir.path().join("folder.zip");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("plain.txt"), b"plain").unwrap();

        let factory = factory();
        let folder = resolve(&factory, &dir);
        assert!(!folder.is_archive());
        assert!(folder.is_directory());

        let file = resolve(&factory, &dir.join("plain.txt"));
        assert_eq!(file.kind(), FileKind::Raw);
        assert_eq!(read_all(&file), "plain");
    }

    #[test]
    fn test_corrupt_archive_fails_on_listing() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp_dir.path().join("bad.zip");
        fs::write(&zip_path, b"this is not a zip file").unwrap();

        let factory = factory();
        let archive = resolve(&factory, &zip_path);
        assert!(archive.is_archive());
        assert!(matches!(archive.ls(), Err(VfsError::Archive { .. })));
        assert!(factory
            .resolve(&FileUrl::from_local_path(&zip_path.join("x.txt")), None)
            .is_err());
    }

    #[test]
    fn test_tree_rebuilt_when_archive_changes() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp_dir.path().join("changing.zip");
        let raw = LocalFile::new(&zip_path);

        write_zip(&zip_path, &[("one.txt", "1")]);
        raw.change_date(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000))
            .unwrap();

        let archive = resolve(&factory(), &zip_path);
        assert_eq!(archive.ls().unwrap().len(), 1);

        write_zip(&zip_path, &[("one.txt", "1"), ("two.txt", "2")]);
        raw.change_date(SystemTime::UNIX_EPOCH + Duration::from_secs(2_000_000))
            .unwrap();
        assert_eq!(archive.ls().unwrap().len(), 2);
    }

    // ============================================================================
    // Tar and single-file compression
    // ============================================================================

    #[test]
    fn test_tar_gz_entries() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let tar_path = temp_dir.path().join("bundle.tar.gz");
        write_tar_gz(
            &tar_path,
            &[
                ("docs/readme.md", "# readme", 0o640),
                ("bin/run.sh", "#!/bin/sh", 0o755),
            ],
        );

        let factory = factory();
        let readme = resolve(&factory, &tar_path.join("docs").join("readme.md"));
        assert_eq!(read_all(&readme), "# readme");
        assert_eq!(readme.permissions().value(), 0o640);
        assert_eq!(
            readme.last_modified(),
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000)
        );

        let archive = readme.parent_archive().unwrap();
        let names: Vec<String> = archive.ls().unwrap().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["bin", "docs"]);

        let script = resolve(&factory, &tar_path.join("bin").join("run.sh"));
        assert_eq!(script.permissions_string(), "-rwxr-xr-x");
    }

    #[test]
    fn test_gzip_single_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let gz_path = temp_dir.path().join("notes.txt.gz");
        let mut encoder = flate2::write::GzEncoder::new(
            fs::File::create(&gz_path).unwrap(),
            flate2::Compression::default(),
        );
        encoder.write_all(b"compressed text").unwrap();
        encoder.finish().unwrap();

        let factory = factory();
        let archive = resolve(&factory, &gz_path);
        let children = archive.ls().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name(), "notes.txt");
        assert_eq!(
            children[0].size(),
            Some(15),
            "Entry should report the decompressed size"
        );

        let entry = resolve(&factory, &gz_path.join("notes.txt"));
        assert_eq!(read_all(&entry), "compressed text");
    }

    #[test]
    fn test_corrupt_gzip_fails_on_listing() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let gz_path = temp_dir.path().join("broken.txt.gz");
        fs::write(&gz_path, b"plain bytes, no gzip header").unwrap();

        let archive = resolve(&factory(), &gz_path);
        assert!(archive.is_archive());
        assert!(
            matches!(archive.ls(), Err(VfsError::Archive { .. })),
            "Undecodable gzip should fail as an archive error"
        );
    }

    // ============================================================================
    // Operations on entries
    // ============================================================================

    #[test]
    fn test_checksum_of_entry() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp_dir.path().join("sum.zip");
        write_zip(&zip_path, &[("hello.txt", "hello")]);

        let entry = resolve(&factory(), &zip_path.join("hello.txt"));
        assert_eq!(
            entry.checksum(ChecksumAlgorithm::Sha256).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_copy_entries_out_of_archive() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp_dir.path().join("src.zip");
        write_zip(
            &zip_path,
            &[("dir/a.txt", "alpha"), ("dir/sub/b.txt", "beta")],
        );

        let factory = factory();
        let dir = resolve(&factory, &zip_path.join("dir"));
        let dest = temp_dir.path().join("extracted");
        dir.copy_to(&LocalFile::new(&dest)).expect("Copy failed");

        assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"alpha");
        assert_eq!(fs::read(dest.join("sub").join("b.txt")).unwrap(), b"beta");
    }

    #[test]
    fn test_archive_is_same_file_as_raw() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let zip_path = temp_dir.path().join("same.zip");
        write_zip(&zip_path, &[("x", "x")]);

        let archive = resolve(&factory(), &zip_path);
        let raw = LocalFile::new(&zip_path);
        assert!(archive.is_same_file(&raw));
        assert!(raw.is_same_file(archive.as_ref()));
    }
}

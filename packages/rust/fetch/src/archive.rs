//! gzip + tar extraction into a destination directory.

use std::io;
use std::path::Path;

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tracing::debug;

/// Unpack a `.tar.gz` byte buffer into `dest`.
///
/// The archive is first unpacked into a staging directory inside `dest`;
/// its top-level entries are moved into `dest` only once every entry has
/// been written. If anything fails the staging directory is removed and
/// `dest` is left as it was. Returns the number of regular files written.
pub fn unpack_tar_gz(bytes: &[u8], dest: &Path) -> io::Result<usize> {
    std::fs::create_dir_all(dest)?;

    let staging = tempfile::Builder::new()
        .prefix(".unpack-")
        .tempdir_in(dest)?;

    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut files = 0usize;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();

        match entry.header().entry_type() {
            EntryType::Regular | EntryType::Directory => {}
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "unsupported entry type {other:?} for {}",
                        entry_path.display()
                    ),
                ));
            }
        }

        if !entry.unpack_in(staging.path())? {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("entry {} escapes the destination", entry_path.display()),
            ));
        }

        if entry.header().entry_type() == EntryType::Regular {
            files += 1;
        }
        debug!(path = %entry_path.display(), "unpacked entry");
    }

    let mut moves = Vec::new();
    for child in std::fs::read_dir(staging.path())? {
        let child = child?;
        let target = dest.join(child.file_name());
        if target.symlink_metadata().is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", target.display()),
            ));
        }
        moves.push((child.path(), target));
    }

    for (from, to) in moves {
        std::fs::rename(from, to)?;
    }

    Ok(files)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    /// Build an in-memory `.tar.gz` from `(path, content)` pairs.
    pub(crate) fn tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn unpacks_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let archive = tar_gz(&[
            ("namespace.yaml", "kind: Namespace\n"),
            ("source-controller/deployment.yaml", "kind: Deployment\n"),
        ]);

        let count = unpack_tar_gz(&archive, dir.path()).unwrap();

        assert_eq!(count, 2);
        assert_eq!(entries(dir.path()), vec!["namespace.yaml", "source-controller"]);
        let deployment =
            std::fs::read_to_string(dir.path().join("source-controller/deployment.yaml")).unwrap();
        assert_eq!(deployment, "kind: Deployment\n");
    }

    #[test]
    fn corrupt_archive_leaves_dest_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = tar_gz(&[("a.yaml", "kind: A\n"), ("b.yaml", "kind: B\n")]);
        archive.truncate(archive.len() / 2);

        assert!(unpack_tar_gz(&archive, dir.path()).is_err());
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn collision_moves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yaml"), "kept\n").unwrap();
        let archive = tar_gz(&[
            ("a.yaml", "kind: A\n"),
            ("b.yaml", "kind: B\n"),
            ("c.yaml", "kind: C\n"),
        ]);

        let err = unpack_tar_gz(&archive, dir.path()).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(entries(dir.path()), vec!["b.yaml"]);
        assert_eq!(std::fs::read_to_string(dir.path().join("b.yaml")).unwrap(), "kept\n");
    }

    #[test]
    fn not_gzip_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(unpack_tar_gz(b"definitely not gzip", dir.path()).is_err());
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn traversal_entry_is_rejected() {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let content = b"kind: Evil\n";
        let mut header = tar::Header::new_old();
        let name = b"../evil.yaml";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        builder.append(&header, &content[..]).unwrap();
        let archive = builder.into_inner().unwrap().finish().unwrap();

        let parent = tempfile::tempdir().unwrap();
        let dest = parent.path().join("dest");
        let err = unpack_tar_gz(&archive, &dest).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(!parent.path().join("evil.yaml").exists());
        assert!(entries(&dest).is_empty());
    }
}

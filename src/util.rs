#[cfg(test)]
pub mod test_utils {
    use std::fs::{self, DirEntry};
    use std::path::Path;

    use tempfile::TempDir;

    /// Manages a temporary directory for a test. Will be cleaned up when
    /// the struct is dropped.
    pub struct CacheDirTest {
        dir: TempDir,
    }

    impl CacheDirTest {
        pub fn new(dir_prefix: &str) -> Self {
            CacheDirTest {
                dir: tempfile::Builder::new()
                    .prefix(dir_prefix)
                    .tempdir()
                    .unwrap(),
            }
        }

        pub fn get_path(&self) -> &Path {
            self.dir.path()
        }

        pub fn get_entries(&self) -> Vec<DirEntry> {
            fs::read_dir(self.dir.path())
                .unwrap()
                .map(|e| e.unwrap())
                .collect()
        }
    }
}

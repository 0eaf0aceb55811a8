use crate::{ModFile, OrchestratorError};

pub const ACCEPTED_EXTENSIONS: [&str; 4] = [".jar", ".zip", ".json", ".mcmeta"];
pub const MAX_FILE_BYTES: u64 = 100 * 1024 * 1024;

/// Which dropped files may become jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePolicy {
    pub accepted_extensions: Vec<String>,
    pub max_bytes: u64,
}

impl Default for FilePolicy {
    fn default() -> Self {
        Self {
            accepted_extensions: ACCEPTED_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
            max_bytes: MAX_FILE_BYTES,
        }
    }
}

impl FilePolicy {
    pub fn check(&self, file: &ModFile) -> Result<(), OrchestratorError> {
        let accepted = file.extension().is_some_and(|ext| {
            self.accepted_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(&ext))
        });
        if !accepted {
            return Err(OrchestratorError::FileRejected {
                file_name: file.file_name.clone(),
                reason: format!(
                    "unsupported file type, expected one of {}",
                    self.accepted_extensions.join(", ")
                ),
            });
        }
        if file.size_bytes > self.max_bytes {
            return Err(OrchestratorError::FileRejected {
                file_name: file.file_name.clone(),
                reason: format!(
                    "file too large ({} bytes, max {})",
                    file.size_bytes, self.max_bytes
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_mod_files() {
        let policy = FilePolicy::default();
        for name in ["a.jar", "b.ZIP", "pack.mcmeta", "c.json"] {
            assert!(policy.check(&ModFile::new(name, 10)).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_wrong_type_and_oversize() {
        let policy = FilePolicy::default();
        assert!(matches!(
            policy.check(&ModFile::new("virus.exe", 10)),
            Err(OrchestratorError::FileRejected { .. })
        ));
        assert!(matches!(
            policy.check(&ModFile::new("huge.jar", MAX_FILE_BYTES + 1)),
            Err(OrchestratorError::FileRejected { .. })
        ));
        assert!(policy.check(&ModFile::new("edge.jar", MAX_FILE_BYTES)).is_ok());
    }
}

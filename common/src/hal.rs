use std::path::Path;

use crate::error::{FsError, HardwareError, MountError};
use crate::state::ButtonLevel;

pub trait Camera {
    fn init(&mut self) -> Result<(), HardwareError>;
    fn capture(&mut self) -> Result<Vec<u8>, HardwareError>;
}

pub trait StorageMedium {
    fn mount(&mut self, mount_point: &Path) -> Result<(), MountError>;
    fn sync(&mut self) -> Result<(), FsError>;
    fn unmount(&mut self);
}

pub trait ButtonInput {
    fn level(&mut self) -> ButtonLevel;
}

#[cfg(test)]
pub mod mock {
    use std::collections::VecDeque;
    use std::fs;
    use std::io;
    use std::path::Path;

    use super::{ButtonInput, Camera, StorageMedium};
    use crate::error::{FsError, HardwareError, MountError};
    use crate::state::ButtonLevel;

    pub struct MockCamera {
        pub frame: Vec<u8>,
        pub fail: bool,
        pub captures: usize,
    }

    impl MockCamera {
        pub fn with_frame(frame: Vec<u8>) -> Self {
            Self {
                frame,
                fail: false,
                captures: 0,
            }
        }
    }

    impl Camera for MockCamera {
        fn init(&mut self) -> Result<(), HardwareError> {
            Ok(())
        }

        fn capture(&mut self) -> Result<Vec<u8>, HardwareError> {
            if self.fail {
                return Err(HardwareError("mock sensor offline".into()));
            }
            self.captures += 1;
            Ok(self.frame.clone())
        }
    }

    pub struct MockMedium {
        pub fail_mount: bool,
        pub fail_sync: bool,
    }

    impl Default for MockMedium {
        fn default() -> Self {
            Self {
                fail_mount: false,
                fail_sync: false,
            }
        }
    }

    impl StorageMedium for MockMedium {
        fn mount(&mut self, mount_point: &Path) -> Result<(), MountError> {
            if self.fail_mount {
                return Err(MountError::MediumUnavailable {
                    mount_point: mount_point.display().to_string(),
                    reason: "no card present".into(),
                });
            }
            fs::create_dir_all(mount_point).map_err(|err| MountError::MediumUnavailable {
                mount_point: mount_point.display().to_string(),
                reason: err.to_string(),
            })
        }

        fn sync(&mut self) -> Result<(), FsError> {
            if self.fail_sync {
                return Err(FsError::new(
                    "sync",
                    Path::new("mock"),
                    io::Error::new(io::ErrorKind::Unsupported, "flush primitive unavailable"),
                ));
            }
            Ok(())
        }

        fn unmount(&mut self) {}
    }

    pub struct ScriptedButton {
        pub levels: VecDeque<ButtonLevel>,
    }

    impl ScriptedButton {
        pub fn new(levels: &[ButtonLevel]) -> Self {
            Self {
                levels: levels.iter().copied().collect(),
            }
        }
    }

    impl ButtonInput for ScriptedButton {
        fn level(&mut self) -> ButtonLevel {
            self.levels.pop_front().unwrap_or(ButtonLevel::High)
        }
    }
}

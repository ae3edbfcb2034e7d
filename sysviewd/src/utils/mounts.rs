//! Mount point helpers.
//!
//! Mount points arrive in platform-specific shapes (`C:\`, `C:`, `/mnt/data/`).
//! Usage queries take one canonical form: forward slashes, a drive root
//! always carries its slash, and no trailing slash elsewhere.

/// Filesystems that never represent storage a user cares about.
const PSEUDO_FILESYSTEMS: &[&str] = &[
    "autofs",
    "binfmt_misc",
    "bpf",
    "cgroup",
    "cgroup2",
    "configfs",
    "debugfs",
    "devpts",
    "devtmpfs",
    "efivarfs",
    "fusectl",
    "hugetlbfs",
    "mqueue",
    "nsfs",
    "proc",
    "pstore",
    "ramfs",
    "securityfs",
    "squashfs",
    "sysfs",
    "tmpfs",
    "tracefs",
];

pub fn is_pseudo_filesystem(fs_type: &str) -> bool {
    let fs_type = fs_type.trim().to_ascii_lowercase();
    PSEUDO_FILESYSTEMS.contains(&fs_type.as_str())
}

fn is_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

pub fn canonical_mountpoint(raw: &str) -> String {
    let path = raw.trim().replace('\\', "/");
    if path.is_empty() {
        return "/".to_string();
    }

    if is_drive_prefix(&path) {
        let (drive, rest) = path.split_at(2);
        let rest = rest.trim_matches('/');
        return if rest.is_empty() {
            format!("{drive}/")
        } else {
            format!("{drive}/{rest}")
        };
    }

    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

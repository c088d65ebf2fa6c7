/// Application name, as presented to the user.
pub const APP_NAME: &str = "TeeView";

/// Application name in the Unix style, used for file and directory names.
pub const APP_UNIX_NAME: &str = "teeview";

/// How a decrypted file is presented by the inline view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// Served as-is with `application/pdf`.
    Pdf,
    /// Decoded as UTF-8 and shown inline.
    Text,
    /// No inline rendering; the file can only be downloaded.
    DownloadOnly,
}

impl ViewKind {
    /// Pick by extension, case-insensitively. The extension is whatever
    /// follows the last `.`; a name without a dot is its own extension.
    pub fn for_filename(filename: &str) -> Self {
        let ext = filename
            .rsplit('.')
            .next()
            .unwrap_or(filename)
            .to_ascii_lowercase();

        match ext.as_str() {
            "pdf" => ViewKind::Pdf,
            "txt" | "csv" | "md" => ViewKind::Text,
            _ => ViewKind::DownloadOnly,
        }
    }
}

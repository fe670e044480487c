use crate::error::DumpError;
use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Sequential byte source over a compressed dump file.
///
/// The container is selected from the file extension. Decompressed size is
/// never required up front; the decoder context and file handle are released
/// on drop, on every exit path.
pub enum Decompressor {
    Bz2(MultiBzDecoder<File>),
    Gz(MultiGzDecoder<File>),
    Plain(File),
}

impl Decompressor {
    pub fn open(path: &Path) -> Result<Self, DumpError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let file = File::open(path)?;
        match extension.as_deref() {
            // Wikimedia ships multi-stream bz2 archives, hence the Multi decoders.
            Some("bz2") => Ok(Decompressor::Bz2(MultiBzDecoder::new(file))),
            Some("gz") => Ok(Decompressor::Gz(MultiGzDecoder::new(file))),
            Some("xml") | Some("txt") | Some("sql") => Ok(Decompressor::Plain(file)),
            _ => Err(DumpError::UnknownContainer {
                path: path.to_path_buf(),
            }),
        }
    }
}

impl Read for Decompressor {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Decompressor::Bz2(r) => r.read(buf),
            Decompressor::Gz(r) => r.read(buf),
            Decompressor::Plain(r) => r.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::io::Write;

    #[test]
    fn reads_bz2_container() {
        let mut encoder = BzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(b"<mediawiki></mediawiki>").unwrap();
        let compressed = encoder.finish().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.xml.bz2");
        std::fs::write(&path, compressed).unwrap();

        let mut out = String::new();
        Decompressor::open(&path)
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "<mediawiki></mediawiki>");
    }

    #[test]
    fn reads_plain_xml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.xml");
        std::fs::write(&path, "<mediawiki/>").unwrap();

        let mut out = String::new();
        Decompressor::open(&path)
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "<mediawiki/>");
    }

    #[test]
    fn rejects_unknown_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.7z");
        std::fs::write(&path, b"7z\xbc\xaf").unwrap();

        assert!(matches!(
            Decompressor::open(&path),
            Err(DumpError::UnknownContainer { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            Decompressor::open(Path::new("/nonexistent/dump.xml.bz2")),
            Err(DumpError::Io(_))
        ));
    }
}

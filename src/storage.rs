use std::ffi::OsString;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{self, AsyncRead, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use rusoto_core::{ByteStream, Region};
use rusoto_s3::{GetObjectOutput, GetObjectRequest, PutObjectRequest, S3Client, S3};

use super::config::ManifestConfiguration;
use super::Error;

/// The two object operations a manifest needs from a bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes the whole object at `key` to `dest`, replacing any existing file.
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), Error>;

    /// Uploads the whole file at `src` to `key`.
    async fn upload(&self, bucket: &str, key: &str, src: &Path) -> Result<(), Error>;
}

pub struct S3Store {
    s3_client: S3Client,
}

impl S3Store {
    pub fn new(s3_client: S3Client) -> Self {
        Self { s3_client }
    }

    pub fn from_config(config: &ManifestConfiguration) -> Self {
        Self::new(S3Client::new(region(config.endpoint())))
    }
}

pub fn region(endpoint: Option<&str>) -> Region {
    let default = Region::default();
    match endpoint {
        Some(endpoint) => {
            let region = Region::Custom {
                name: default.name().to_owned(),
                endpoint: endpoint.to_owned(),
            };
            debug!(?region, "using non-standard S3 endpoint");
            region
        }
        None => default,
    }
}

/// Opens `src` as a streamed request body, returning it with the file length.
pub async fn file_body(src: &Path) -> Result<(ByteStream, u64), Error> {
    let file = fs::File::open(src).await?;
    let len = file.metadata().await?.len();
    Ok((ByteStream::new_with_size(ReaderStream::new(file), len as usize), len))
}

/// Streams `src` into a hidden `.<name>.part` sibling of `dest` and renames it
/// into place once complete. On failure the partial file is removed and
/// `dest` is left as it was.
pub async fn write_replacing<R>(dest: &Path, src: &mut R) -> Result<u64, Error>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let name = dest.file_name().ok_or("download target has no file name")?;
    let mut part_name = OsString::from(".");
    part_name.push(name);
    part_name.push(".part");
    let part = dest.with_file_name(part_name);

    let written = match copy_into(&part, src).await {
        Ok(written) => written,
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&part).await {
                debug!(path = %part.display(), %cleanup, "failed to remove partial download");
            }
            return Err(e);
        }
    };
    fs::rename(&part, dest).await?;
    Ok(written)
}

async fn copy_into<R>(path: &Path, src: &mut R) -> Result<u64, Error>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut file = fs::File::create(path).await?;
    let written = io::copy(src, &mut file).await?;
    file.flush().await?;
    Ok(written)
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), Error> {
        let request = GetObjectRequest {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            ..Default::default()
        };
        let GetObjectOutput { body, .. } = self.s3_client.get_object(request).await?;
        let mut source = Box::pin(body.ok_or("no body in GetObject response")?.into_async_read());
        write_replacing(dest, &mut source).await?;
        Ok(())
    }

    async fn upload(&self, bucket: &str, key: &str, src: &Path) -> Result<(), Error> {
        let (body, len) = file_body(src).await?;
        let request = PutObjectRequest {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            content_length: Some(len as i64),
            body: Some(body),
            ..Default::default()
        };
        self.s3_client.put_object(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream, TryStreamExt};
    use tokio_util::io::StreamReader;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn endpoint_override_makes_a_custom_region() {
        match region(Some("http://localhost:9000")) {
            Region::Custom { endpoint, .. } => assert_eq!(endpoint, "http://localhost:9000"),
            other => panic!("unexpected region: {:?}", other),
        }
        match region(None) {
            Region::Custom { .. } => panic!("no endpoint was configured"),
            _ => {}
        }
    }

    #[tokio::test]
    async fn file_body_streams_the_file_with_its_length() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("weights.bin");
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&src, &content).unwrap();

        let (body, len) = file_body(&src).await.unwrap();
        assert_eq!(len, 200_000);
        assert_eq!(body.size_hint(), Some(200_000));
        let streamed: Vec<u8> = body.map_ok(|chunk| chunk.to_vec()).try_concat().await.unwrap();
        assert_eq!(streamed, content);
    }

    #[tokio::test]
    async fn file_body_fails_on_a_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = file_body(&dir.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn write_replacing_swaps_in_the_complete_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("test_file");
        std::fs::write(&dest, "existing content, which is longer").unwrap();

        let chunks: Vec<io::Result<&[u8]>> = vec![Ok(&b"down"[..]), Ok(&b"loaded"[..])];
        let mut src = StreamReader::new(stream::iter(chunks));
        let written = write_replacing(&dest, &mut src).await.unwrap();

        assert_eq!(written, 10);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "downloaded");
        assert_eq!(entries(dir.path()), vec!["test_file"]);
    }

    #[tokio::test]
    async fn interrupted_write_leaves_the_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("test_file");
        std::fs::write(&dest, "existing content").unwrap();

        let chunks: Vec<io::Result<&[u8]>> = vec![
            Ok(&b"partial"[..]),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")),
        ];
        let mut src = StreamReader::new(stream::iter(chunks));
        let err = write_replacing(&dest, &mut src).await.unwrap_err();

        assert!(matches!(err, Error::Io(_)));
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "existing content");
        assert_eq!(entries(dir.path()), vec!["test_file"]);
    }
}

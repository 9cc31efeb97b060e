//! Async adapters feeding a request body into a [`TransferEngine`].

use crate::session::TransferEngine;
use crate::storage::Storage;
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

impl<S: Storage> TransferEngine<S> {
    /// Feeds every chunk of `stream` into the current request and completes
    /// it, as [`on_body_chunk`](TransferEngine::on_body_chunk) followed by
    /// [`on_request_complete`](TransferEngine::on_request_complete) would.
    ///
    /// A stream error abandons the upload in progress.
    ///
    /// # Examples
    ///
    /// ```
    /// use bytes::Bytes;
    /// use futures_util::stream::once;
    /// use flashdrop::{MemStorage, TransferEngine};
    /// use std::convert::Infallible;
    ///
    /// # async fn run() -> flashdrop::Result<()> {
    /// let body = "--XYZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\r\nhello\r\n--XYZ--\r\n";
    /// let stream = once(async move { Result::<Bytes, Infallible>::Ok(Bytes::from(body)) });
    ///
    /// let mut engine = TransferEngine::new(MemStorage::new());
    /// engine.on_request_headers_complete("/handleupload", Some("multipart/form-data; boundary=XYZ"))?;
    /// engine.on_body_stream(stream).await?;
    ///
    /// assert_eq!(engine.storage().contents("a.txt").unwrap(), b"hello");
    /// # Ok(())
    /// # }
    /// # tokio::runtime::Runtime::new().unwrap().block_on(run()).unwrap();
    /// ```
    pub async fn on_body_stream<St, O, E>(&mut self, stream: St) -> crate::Result<()>
    where
        St: Stream<Item = Result<O, E>>,
        O: Into<Bytes>,
        E: Into<BoxError>,
    {
        futures_util::pin_mut!(stream);

        while let Some(item) = stream.next().await {
            let chunk: Bytes = match item {
                Ok(chunk) => chunk.into(),
                Err(err) => {
                    self.abandon();
                    return Err(crate::Error::StreamReadFailed(err.into()));
                }
            };

            if !chunk.is_empty() {
                self.on_body_chunk(&chunk)?;
            }
        }

        self.on_request_complete()
    }

    /// Reads the request body from `reader` until end of file and feeds it
    /// like [`on_body_stream`](TransferEngine::on_body_stream).
    #[cfg(feature = "tokio-io")]
    #[cfg_attr(nightly, doc(cfg(feature = "tokio-io")))]
    pub async fn on_body_reader<R>(&mut self, reader: R) -> crate::Result<()>
    where
        R: tokio::io::AsyncRead,
    {
        self.on_body_stream(tokio_util::io::ReaderStream::new(reader)).await
    }
}

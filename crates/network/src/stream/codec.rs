use std::io;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Upper bound for a single frame. Large enough for a maximal block.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

#[derive(Debug)]
pub(crate) struct FrameCodec {
    length_codec: LengthDelimitedCodec,
}

impl FrameCodec {
    pub(crate) fn new() -> Self {
        Self {
            length_codec: LengthDelimitedCodec::builder()
                .max_frame_length(MAX_FRAME_LEN)
                .new_codec(),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.length_codec.decode(src)?.map(BytesMut::freeze))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.length_codec.encode(item, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use tokio_test::io::Builder;
    use tokio_util::codec::FramedRead;

    use super::*;

    #[test]
    fn test_frame_encoding_decoding() {
        let mut buffer = BytesMut::new();
        let mut codec = FrameCodec::new();
        codec.encode(Bytes::from_static(b"/head"), &mut buffer).unwrap();
        codec.encode(Bytes::new(), &mut buffer).unwrap();

        assert_eq!(&buffer[..4], &[0, 0, 0, 5], "big-endian length prefix");

        let first = codec.decode(&mut buffer).unwrap();
        assert_eq!(first, Some(Bytes::from_static(b"/head")));

        let second = codec.decode(&mut buffer).unwrap();
        assert_eq!(second, Some(Bytes::new()));

        assert_eq!(codec.decode(&mut buffer).unwrap(), None);
    }

    #[tokio::test]
    async fn test_frames_split_across_reads() {
        let mut buffer = BytesMut::new();
        let mut codec = FrameCodec::new();
        codec.encode(Bytes::from_static(b"Hello"), &mut buffer).unwrap();
        codec.encode(Bytes::from_static(b"World"), &mut buffer).unwrap();

        let bytes = buffer.freeze();
        let mut stream = Builder::new()
            .read(&bytes[..3])
            .read(&bytes[3..11])
            .read(&bytes[11..])
            .build();
        let mut framed = FramedRead::new(&mut stream, FrameCodec::new());

        let first = framed.next().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"Hello"));

        let second = framed.next().await.unwrap().unwrap();
        assert_eq!(second, Bytes::from_static(b"World"));

        assert!(framed.next().await.is_none(), "stream should be exhausted");
    }

    #[test]
    fn test_rejects_oversized_frame() {
        let mut codec = FrameCodec::new();
        let len = u32::try_from(MAX_FRAME_LEN + 1).unwrap();

        let mut buffer = BytesMut::from(&len.to_be_bytes()[..]);

        let err = codec.decode(&mut buffer).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}

use criterion::{Criterion, criterion_group, criterion_main};
use http::StatusCode;
use micro_channel::buffer::BufferSegment;
use micro_channel::channel::{ChannelBuilder, NoopEvents};
use micro_channel_http::codec::{MessageDecoder, MessageEncoder};
use micro_channel_http::connection::HttpConnection;
use micro_channel_http::handler::make_handler;
use micro_channel_http::protocol::{HttpMessage, HttpRequest, HttpResponse};
use std::hint::black_box;
use std::{
    error::Error,
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::codec::{Decoder, Encoder};

const REQUEST: &[u8] = b"POST /submit?x=1 HTTP/1.1\r\nHost: localhost\r\nUser-Agent: curl/7.79.1\r\nAccept: */*\r\nContent-Length: 12\r\n\r\nHello World!";

// Mock IO for testing
struct MockIO {
    read_data: Vec<u8>,
    read_pos: usize,
}

impl MockIO {
    fn new(read_data: Vec<u8>) -> Self {
        Self { read_data, read_pos: 0 }
    }
}

impl AsyncRead for MockIO {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let remaining = &self.read_data[self.read_pos..];
        let amt = std::cmp::min(remaining.len(), buf.remaining());
        buf.put_slice(&remaining[..amt]);
        self.read_pos += amt;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockIO {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<Result<usize, io::Error>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }
}

// Test handler
async fn test_handler(req: HttpRequest) -> Result<HttpResponse, Box<dyn Error + Send + Sync>> {
    let mut response = req.create_response();
    response.set_body("Hello World!");
    Ok(response)
}

fn bench_message_decoder(c: &mut Criterion) {
    c.bench_function("decode_simple_request", |b| {
        b.iter(|| {
            let mut decoder = MessageDecoder::default();
            let mut bytes = bytes::BytesMut::from(REQUEST);
            black_box(decoder.decode(&mut bytes).unwrap());
        });
    });

    c.bench_function("decode_byte_by_byte", |b| {
        b.iter(|| {
            let mut decoder = MessageDecoder::default();
            let mut segment = BufferSegment::with_capacity(REQUEST.len());
            let mut decoded = None;
            for byte in REQUEST.chunks(1) {
                segment.write(byte);
                decoded = decoder.decode_segment(&mut segment).unwrap();
            }
            black_box(decoded.unwrap());
        });
    });
}

fn bench_message_encoder(c: &mut Criterion) {
    c.bench_function("encode_simple_response", |b| {
        b.iter(|| {
            let response = HttpResponse::with_body(StatusCode::OK, "Hello World!");
            let mut encoder = MessageEncoder::new();
            let mut bytes = bytes::BytesMut::new();
            black_box(encoder.encode(HttpMessage::from(response), &mut bytes).unwrap());
        });
    });
}

fn bench_http_connection(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let handler = Arc::new(make_handler(test_handler));

    c.bench_function("process_simple_request", |b| {
        b.to_async(&runtime).iter(|| async {
            let channel = ChannelBuilder::new().events(Arc::new(NoopEvents)).open(MockIO::new(REQUEST.to_vec()), None).await.unwrap();
            let mut connection = HttpConnection::new(channel, MessageDecoder::default());
            black_box(connection.process(Arc::clone(&handler)).await.unwrap());
        });
    });
}

criterion_group!(benches, bench_message_decoder, bench_message_encoder, bench_http_connection);
criterion_main!(benches);

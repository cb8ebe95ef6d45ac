//! Tests for the Dispatcher
//!
//! These tests verify:
//! - GET/PUT/DELETE routing to the store
//! - FAIL responses for missing id, bad data and unknown commands
//! - Bad checksums never reaching the store
//! - Store errors surfacing as FAIL messages
//! - One message in, one message out, in both encodings

use std::io::Cursor;
use std::sync::Arc;

use parking_lot::Mutex;

use netkv::dispatcher::{
    BAD_CHECKSUM_MESSAGE, BAD_DATA_MESSAGE, NO_ID_MESSAGE, UNSUPPORTED_COMMAND_MESSAGE,
};
use netkv::protocol::{Body, Command, Encoding, MessageCodec, Request, Response, Status};
use netkv::{Dispatcher, MemoryStore, NetKvError, Result, Store};

// =============================================================================
// Helper Functions
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Get(Vec<u8>),
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// MemoryStore that records every call
#[derive(Default)]
struct RecordingStore {
    inner: MemoryStore,
    calls: Mutex<Vec<Call>>,
    fail_writes: bool,
}

impl RecordingStore {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

impl Store for RecordingStore {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.calls.lock().push(Call::Get(key.to_vec()));
        self.inner.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.calls.lock().push(Call::Put(key.to_vec(), value.to_vec()));
        if self.fail_writes {
            return Err(NetKvError::Storage("disk full".to_string()));
        }
        self.inner.put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.calls.lock().push(Call::Delete(key.to_vec()));
        self.inner.delete(key)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

fn setup(encoding: Encoding) -> (Arc<RecordingStore>, Dispatcher<RecordingStore>) {
    let store = Arc::new(RecordingStore::default());
    let dispatcher = Dispatcher::new(Arc::clone(&store), MessageCodec::new(encoding, 1024 * 1024));
    (store, dispatcher)
}

/// Push raw request bytes through `serve` and decode the single response
fn serve_raw(dispatcher: &Dispatcher<RecordingStore>, input: Vec<u8>) -> Response {
    let mut output = Vec::new();
    dispatcher
        .serve(&mut Cursor::new(input), &mut output)
        .unwrap();
    dispatcher
        .codec()
        .read_response(&mut Cursor::new(output))
        .unwrap()
}

fn serve(dispatcher: &Dispatcher<RecordingStore>, request: Request) -> Response {
    let mut input = Vec::new();
    dispatcher.codec().write_request(&mut input, request).unwrap();
    serve_raw(dispatcher, input)
}

// =============================================================================
// Command Tests
// =============================================================================

#[test]
fn test_put_then_get() {
    let (store, dispatcher) = setup(Encoding::Json);

    let response = dispatcher.handle(Request::put(b"hello".to_vec(), b"world".to_vec()));
    assert!(response.is_ok());
    assert_eq!(response.id, b"hello");
    assert!(response.body.is_none());

    let response = dispatcher.handle(Request::get(b"hello".to_vec()));
    assert!(response.is_ok());
    assert_eq!(response.id, b"hello");
    assert_eq!(response.data(), Some(&b"world"[..]));
    assert!(response.body.unwrap().validate());

    assert_eq!(
        store.calls(),
        vec![
            Call::Put(b"hello".to_vec(), b"world".to_vec()),
            Call::Get(b"hello".to_vec()),
        ]
    );
}

#[test]
fn test_delete_then_get_fails() {
    let (_store, dispatcher) = setup(Encoding::Json);

    dispatcher.handle(Request::put(b"k".to_vec(), b"v".to_vec()));
    let response = dispatcher.handle(Request::delete(b"k".to_vec()));
    assert!(response.is_ok());
    assert_eq!(response.id, b"k");

    let response = dispatcher.handle(Request::get(b"k".to_vec()));
    assert_eq!(response.status, Status::Fail);
    assert_eq!(response.id, b"k");
    assert_eq!(response.message(), NetKvError::KeyNotFound.to_string());
}

#[test]
fn test_delete_absent_key_is_ok() {
    let (_store, dispatcher) = setup(Encoding::Json);
    assert!(dispatcher.handle(Request::delete(b"ghost".to_vec())).is_ok());
}

#[test]
fn test_put_without_data_stores_empty_value() {
    let (store, dispatcher) = setup(Encoding::Json);
    let request = Request {
        body: Some(Body::default()),
        ..Request::new(Command::Put, b"k".to_vec())
    };

    assert!(dispatcher.handle(request).is_ok());
    assert_eq!(store.calls(), vec![Call::Put(b"k".to_vec(), Vec::new())]);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_empty_id_fails_without_store_calls() {
    let (store, dispatcher) = setup(Encoding::Json);

    for request in [
        Request::get(Vec::new()),
        Request::put(Vec::new(), b"v".to_vec()),
        Request::delete(Vec::new()),
    ] {
        let response = dispatcher.handle(request);
        assert_eq!(response.status, Status::Fail);
        assert!(response.id.is_empty());
        assert_eq!(response.message(), NO_ID_MESSAGE);
    }
    assert!(store.calls().is_empty());
}

#[test]
fn test_put_without_body_is_bad_data() {
    let (store, dispatcher) = setup(Encoding::Json);

    let response = dispatcher.handle(Request::new(Command::Put, b"k".to_vec()));
    assert_eq!(response.status, Status::Fail);
    assert_eq!(response.id, b"k");
    assert_eq!(response.message(), BAD_DATA_MESSAGE);
    assert!(store.calls().is_empty());
}

#[test]
fn test_put_with_invalid_body_is_bad_data() {
    let (store, dispatcher) = setup(Encoding::Json);
    let request = Request {
        body: Some(Body {
            data: Some(b"v".to_vec()),
            checksum: 3,
        }),
        ..Request::new(Command::Put, b"k".to_vec())
    };

    assert_eq!(dispatcher.handle(request).message(), BAD_DATA_MESSAGE);
    assert!(store.calls().is_empty());
}

#[test]
fn test_unsupported_and_missing_command() {
    let (store, dispatcher) = setup(Encoding::Json);

    let response = dispatcher.handle(Request::new(Command::Unsupported(42), b"k".to_vec()));
    assert_eq!(response.status, Status::Fail);
    assert_eq!(response.id, b"k");
    assert_eq!(response.message(), UNSUPPORTED_COMMAND_MESSAGE);

    let request = Request {
        command: None,
        ..Request::get(b"k".to_vec())
    };
    assert_eq!(dispatcher.handle(request).message(), UNSUPPORTED_COMMAND_MESSAGE);
    assert!(store.calls().is_empty());
}

#[test]
fn test_store_error_becomes_fail() {
    let store = Arc::new(RecordingStore {
        fail_writes: true,
        ..RecordingStore::default()
    });
    let dispatcher = Dispatcher::new(Arc::clone(&store), MessageCodec::default());

    let response = dispatcher.handle(Request::put(b"k".to_vec(), b"v".to_vec()));
    assert_eq!(response.status, Status::Fail);
    assert!(response.message().contains("disk full"));
}

// =============================================================================
// Serve Tests
// =============================================================================

#[test]
fn test_serve_both_encodings() {
    for encoding in [Encoding::Json, Encoding::Binary] {
        let (_store, dispatcher) = setup(encoding);

        let response = serve(&dispatcher, Request::put(b"hello".to_vec(), b"world".to_vec()));
        assert!(response.is_ok(), "{:?}", encoding);

        let response = serve(&dispatcher, Request::get(b"hello".to_vec()));
        assert_eq!(response.data(), Some(&b"world"[..]), "{:?}", encoding);

        let response = serve(&dispatcher, Request::get(b"other".to_vec()));
        assert_eq!(response.status, Status::Fail, "{:?}", encoding);
    }
}

#[test]
fn test_serve_bad_checksum_never_reaches_store() {
    let (store, dispatcher) = setup(Encoding::Json);
    let raw = br#"{"id":"aw==","command":1,"body":{"data":"dg==","checksum":1}}"#.to_vec();

    let response = serve_raw(&dispatcher, raw);
    assert_eq!(response.status, Status::Fail);
    assert!(response.id.is_empty());
    assert_eq!(response.message(), BAD_CHECKSUM_MESSAGE);
    assert!(store.calls().is_empty());
}

#[test]
fn test_serve_reads_exactly_one_message() {
    let (store, dispatcher) = setup(Encoding::Binary);
    let mut input = Vec::new();
    dispatcher
        .codec()
        .write_request(&mut input, Request::put(b"a".to_vec(), b"1".to_vec()))
        .unwrap();
    dispatcher
        .codec()
        .write_request(&mut input, Request::put(b"b".to_vec(), b"2".to_vec()))
        .unwrap();

    let mut reader = Cursor::new(input);
    let mut output = Vec::new();
    dispatcher.serve(&mut reader, &mut output).unwrap();
    assert_eq!(store.calls().len(), 1);

    dispatcher.serve(&mut reader, &mut output).unwrap();
    assert_eq!(store.calls().len(), 2);

    // Two responses, in order
    let mut responses = Cursor::new(output);
    for _ in 0..2 {
        assert!(dispatcher.codec().read_response(&mut responses).unwrap().is_ok());
    }
}

#[test]
fn test_serve_decode_error_is_returned() {
    let (store, dispatcher) = setup(Encoding::Json);
    let mut output = Vec::new();

    let err = dispatcher
        .serve(&mut Cursor::new(b"garbage".to_vec()), &mut output)
        .unwrap_err();
    assert!(matches!(err, NetKvError::Decode(_)), "{}", err);
    assert!(output.is_empty());
    assert!(store.calls().is_empty());
}

#[test]
fn test_serve_end_of_stream() {
    let (_store, dispatcher) = setup(Encoding::Binary);
    let mut output = Vec::new();

    let err = dispatcher
        .serve(&mut Cursor::new(Vec::new()), &mut output)
        .unwrap_err();
    assert!(err.is_disconnect());
}

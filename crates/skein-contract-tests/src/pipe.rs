use skein_pipe::Pipe;

/// P3 — pipe monotonicity: drains `reader` to end-of-stream, asserting that
/// the concatenation of every non-empty `read` call equals `expected` and
/// that the reader's reported position always advances by exactly the
/// number of bytes just returned.
pub fn assert_contiguous_reads(reader: &skein_pipe::PipeReader, expected: &[u8]) {
    let mut collected = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let before = reader.position();
        let n = reader.read(&mut buf).expect("reading from a non-poisoned pipe never errors");
        assert_eq!(reader.position(), before + n, "position must advance by exactly the bytes read");
        if n == 0 {
            break;
        }
        collected.extend_from_slice(&buf[..n]);
    }
    assert_eq!(collected, expected, "concatenated reads must equal the writer's full buffer");
}

/// P4 — late-join equivalence: opens a second reader on `pipe` after some
/// bytes may already have been written, and asserts it still observes the
/// identical byte sequence as `first_reader_bytes` once drained (readers
/// always start at offset 0, regardless of when they join).
pub fn assert_late_join_equivalence(pipe: &std::sync::Arc<Pipe>, first_reader_bytes: &[u8]) {
    let late = pipe.open_reader();
    assert_contiguous_reads(&late, first_reader_bytes);
}

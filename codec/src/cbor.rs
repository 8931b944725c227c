use minicbor as cbor;

pub(crate) type DecodeResult<T> = Result<T, cbor::decode::Error>;

/// Expect a definite-length array of exactly `len` items
pub(crate) fn array_of(d: &mut cbor::Decoder<'_>, len: u64, what: &str) -> DecodeResult<()> {
    match d.array()? {
        Some(n) if n == len => Ok(()),
        Some(n) => Err(cbor::decode::Error::message(format!(
            "{what}: expected array of {len}, got {n}"
        ))),
        None => Err(cbor::decode::Error::message(format!(
            "{what}: indefinite-length array"
        ))),
    }
}

/// Capture the next data item verbatim
pub(crate) fn raw_item(d: &mut cbor::Decoder<'_>) -> DecodeResult<Vec<u8>> {
    let start = d.position();
    d.skip()?;
    Ok(d.input()[start..d.position()].to_vec())
}

/// Capture the next data item verbatim, requiring it to be an array of `len`
pub(crate) fn raw_array(d: &mut cbor::Decoder<'_>, len: u64, what: &str) -> DecodeResult<Vec<u8>> {
    let start = d.position();
    array_of(d, len, what)?;
    d.set_position(start);
    raw_item(d)
}

pub(crate) fn sized_bytes(d: &mut cbor::Decoder<'_>, len: usize, what: &str) -> DecodeResult<Vec<u8>> {
    let bytes = d.bytes()?;
    if bytes.len() != len {
        return Err(cbor::decode::Error::message(format!(
            "{what}: expected {len} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes.to_vec())
}

/// Decode a single item that must span all of `bytes`
pub(crate) fn decode_exact<'b, T>(bytes: &'b [u8]) -> DecodeResult<T>
where
    T: cbor::Decode<'b, ()>,
{
    let mut d = cbor::Decoder::new(bytes);
    let value = d.decode()?;
    if d.position() != bytes.len() {
        return Err(cbor::decode::Error::message(format!(
            "{} trailing bytes",
            bytes.len() - d.position()
        )));
    }
    Ok(value)
}

/// Write an already-encoded item
pub(crate) fn write_raw<W: cbor::encode::Write>(
    e: &mut cbor::Encoder<W>,
    raw: &[u8],
) -> Result<(), cbor::encode::Error<W::Error>> {
    e.writer_mut().write_all(raw).map_err(cbor::encode::Error::write)
}

//! CARv1 block lookup and DAG-CBOR to JSON conversion.

use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use cid::Cid;
use ciborium::Value as Cbor;
use serde_json::{Map, Number, Value as Json};

use super::StreamError;

/// DAG-CBOR tag for CID links.
const CID_TAG: u64 = 42;

/// Read an unsigned LEB128 varint at `*pos`, advancing it.
pub fn read_varint(bytes: &[u8], pos: &mut usize) -> Result<u64, StreamError> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        let byte = *bytes
            .get(*pos)
            .ok_or_else(|| StreamError::Decode("truncated varint".to_string()))?;
        *pos += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(StreamError::Decode("varint overflow".to_string()))
}

fn section<'a>(bytes: &'a [u8], pos: &mut usize) -> Result<&'a [u8], StreamError> {
    let len = read_varint(bytes, pos)? as usize;
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| StreamError::Decode("car section exceeds buffer".to_string()))?;
    let out = &bytes[*pos..end];
    *pos = end;
    Ok(out)
}

/// Find the block for `target` in a CAR archive without decoding other blocks.
pub fn find_block<'a>(car: &'a [u8], target: &Cid) -> Result<Option<&'a [u8]>, StreamError> {
    let mut pos = 0;
    section(car, &mut pos)?; // header

    while pos < car.len() {
        let block = section(car, &mut pos)?;
        let mut reader = Cursor::new(block);
        let cid = Cid::read_bytes(&mut reader).map_err(|e| StreamError::Decode(format!("bad block cid: {e}")))?;
        if &cid == target {
            let start = reader.position() as usize;
            return Ok(Some(&block[start..]));
        }
    }
    Ok(None)
}

/// Decode a tag-42 link value into a CID.
pub fn link_to_cid(value: &Cbor) -> Option<Cid> {
    match value {
        Cbor::Tag(CID_TAG, inner) => match inner.as_ref() {
            Cbor::Bytes(bytes) => {
                let raw = bytes.strip_prefix(&[0u8]).unwrap_or(bytes);
                Cid::try_from(raw).ok()
            }
            _ => None,
        },
        _ => None,
    }
}

/// Decode a DAG-CBOR block into JSON.
pub fn decode_block(block: &[u8]) -> Result<Json, StreamError> {
    let value: Cbor = ciborium::de::from_reader(block).map_err(|e| StreamError::Decode(e.to_string()))?;
    Ok(cbor_to_json(value))
}

/// Links become `{"$link": cid}` and byte strings `{"$bytes": base64}`.
pub fn cbor_to_json(value: Cbor) -> Json {
    match value {
        Cbor::Null => Json::Null,
        Cbor::Bool(b) => Json::Bool(b),
        Cbor::Integer(i) => {
            let i = i128::from(i);
            i64::try_from(i)
                .map(Json::from)
                .or_else(|_| u64::try_from(i).map(Json::from))
                .unwrap_or_else(|_| Json::String(i.to_string()))
        }
        Cbor::Float(f) => Number::from_f64(f).map_or(Json::Null, Json::Number),
        Cbor::Text(s) => Json::String(s),
        Cbor::Bytes(b) => {
            let mut map = Map::new();
            map.insert("$bytes".to_string(), Json::String(general_purpose::STANDARD_NO_PAD.encode(b)));
            Json::Object(map)
        }
        Cbor::Array(items) => Json::Array(items.into_iter().map(cbor_to_json).collect()),
        Cbor::Map(entries) => Json::Object(
            entries
                .into_iter()
                .map(|(k, v)| {
                    let key = match k {
                        Cbor::Text(s) => s,
                        other => cbor_to_json(other).to_string(),
                    };
                    (key, cbor_to_json(v))
                })
                .collect(),
        ),
        tagged @ Cbor::Tag(CID_TAG, _) => match link_to_cid(&tagged) {
            Some(cid) => {
                let mut map = Map::new();
                map.insert("$link".to_string(), Json::String(cid.to_string()));
                Json::Object(map)
            }
            None => Json::Null,
        },
        Cbor::Tag(_, inner) => cbor_to_json(*inner),
        _ => Json::Null,
    }
}

/// Look up a key in a CBOR map.
pub fn map_get<'a>(value: &'a Cbor, key: &str) -> Option<&'a Cbor> {
    value
        .as_map()?
        .iter()
        .find(|(k, _)| k.as_text() == Some(key))
        .map(|(_, v)| v)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use cid::multihash::Multihash;

    pub const DAG_CBOR: u64 = 0x71;

    pub fn write_varint(mut n: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (n & 0x7f) as u8;
            n >>= 7;
            if n == 0 {
                out.push(byte);
                return;
            }
            out.push(byte | 0x80);
        }
    }

    pub fn cbor_bytes(value: &Cbor) -> Vec<u8> {
        let mut out = Vec::new();
        ciborium::ser::into_writer(value, &mut out).unwrap();
        out
    }

    pub fn fake_cid(seed: u8) -> Cid {
        let digest = Multihash::<64>::wrap(0x12, &[seed; 32]).unwrap();
        Cid::new_v1(DAG_CBOR, digest)
    }

    pub fn link(cid: &Cid) -> Cbor {
        let mut bytes = vec![0u8];
        bytes.extend(cid.to_bytes());
        Cbor::Tag(CID_TAG, Box::new(Cbor::Bytes(bytes)))
    }

    /// A CARv1 archive holding `blocks`.
    pub fn build_car(blocks: &[(Cid, Vec<u8>)]) -> Vec<u8> {
        let header = cbor_bytes(&Cbor::Map(vec![
            (Cbor::Text("version".into()), Cbor::Integer(1u8.into())),
            (Cbor::Text("roots".into()), Cbor::Array(vec![])),
        ]));
        let mut out = Vec::new();
        write_varint(header.len() as u64, &mut out);
        out.extend(header);
        for (cid, data) in blocks {
            let cid_bytes = cid.to_bytes();
            write_varint((cid_bytes.len() + data.len()) as u64, &mut out);
            out.extend(cid_bytes);
            out.extend(data);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_varint() {
        let mut buf = Vec::new();
        write_varint(300, &mut buf);
        let mut pos = 0;
        assert_eq!(read_varint(&buf, &mut pos).unwrap(), 300);
        assert_eq!(pos, 2);
        assert!(read_varint(&[0x80], &mut 0).is_err());
    }

    #[test]
    fn test_find_block_by_cid() {
        let a = fake_cid(1);
        let b = fake_cid(2);
        let car = build_car(&[(a, vec![0xa0]), (b, cbor_bytes(&Cbor::Text("hi".into())))]);

        assert_eq!(find_block(&car, &b).unwrap(), Some(&cbor_bytes(&Cbor::Text("hi".into()))[..]));
        assert_eq!(find_block(&car, &fake_cid(3)).unwrap(), None);
    }

    #[test]
    fn test_truncated_car_is_an_error() {
        let mut car = build_car(&[(fake_cid(1), vec![0xa0])]);
        car.truncate(car.len() - 1);
        assert!(find_block(&car, &fake_cid(9)).is_err());
    }

    #[test]
    fn test_cbor_to_json_links_and_bytes() {
        let cid = fake_cid(4);
        let value = Cbor::Map(vec![
            (Cbor::Text("text".into()), Cbor::Text("hello".into())),
            (Cbor::Text("count".into()), Cbor::Integer(3u8.into())),
            (Cbor::Text("ref".into()), link(&cid)),
            (Cbor::Text("raw".into()), Cbor::Bytes(vec![1, 2, 3])),
        ]);
        let json = cbor_to_json(value);
        assert_eq!(json["text"], "hello");
        assert_eq!(json["count"], 3);
        assert_eq!(json["ref"]["$link"], cid.to_string());
        assert_eq!(json["raw"]["$bytes"], "AQID");
        assert_eq!(link_to_cid(&link(&cid)), Some(cid));
    }
}

use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::ParseError;

/// Maximum wire length of a domain name (RFC 1035 section 2.3.4)
pub const MAX_NAME_LENGTH: usize = 255;
/// Maximum length of a single label
pub const MAX_LABEL_LENGTH: usize = 63;

const MAX_POINTER_HOPS: usize = 16;

pub trait PacketComponent {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError>;

    /// Read the component; `packet` is the whole message, needed to follow
    /// compression pointers.
    fn read<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet: &[u8],
    ) -> Result<(), ParseError>;

    fn read_labels<E: Endianness>(
        &self,
        reader: &mut BitReader<&[u8], E>,
        packet: &[u8],
    ) -> Result<Vec<String>, ParseError> {
        let mut labels = Vec::new();
        loop {
            let label_len = reader.read_var::<u8>(8)?;
            if label_len == 0 {
                break;
            }
            if label_len & 0xC0 == 0xC0 {
                let low = reader.read_var::<u8>(8)?;
                let offset = (((label_len & 0x3F) as usize) << 8) | low as usize;
                labels.extend(decode_name_at(packet, offset)?);
                break;
            }
            if label_len as usize > MAX_LABEL_LENGTH {
                return Err(ParseError::InvalidLabel);
            }
            let mut buf = vec![0; label_len as usize];
            reader.read_bytes(&mut buf)?;
            labels.push(String::from_utf8(buf).map_err(|_| ParseError::InvalidLabel)?);
        }

        check_name_length(&labels)?;
        Ok(labels)
    }

    fn write_labels<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
        labels: &[String],
    ) -> Result<(), ParseError> {
        check_name_length(labels)?;
        for label in labels {
            if label.len() > MAX_LABEL_LENGTH {
                return Err(ParseError::InvalidLabel);
            }
            writer.write_var::<u8>(8, label.len() as u8)?;
            writer.write_bytes(label.as_bytes())?;
        }
        writer.write_var::<u8>(8, 0)?;

        Ok(())
    }
}

/// Decode a (possibly compressed) name starting at `offset` of `packet`.
pub fn decode_name_at(packet: &[u8], mut offset: usize) -> Result<Vec<String>, ParseError> {
    let mut labels = Vec::new();
    let mut hops = 0;

    loop {
        let len = *packet.get(offset).ok_or(ParseError::InvalidLabel)? as usize;
        if len == 0 {
            break;
        }
        if len & 0xC0 == 0xC0 {
            hops += 1;
            if hops > MAX_POINTER_HOPS {
                return Err(ParseError::InvalidLabel);
            }
            let low = *packet.get(offset + 1).ok_or(ParseError::InvalidLabel)? as usize;
            offset = ((len & 0x3F) << 8) | low;
            continue;
        }
        if len > MAX_LABEL_LENGTH {
            return Err(ParseError::InvalidLabel);
        }
        let bytes = packet
            .get(offset + 1..offset + 1 + len)
            .ok_or(ParseError::InvalidLabel)?;
        labels.push(String::from_utf8(bytes.to_vec()).map_err(|_| ParseError::InvalidLabel)?);
        offset += 1 + len;
    }

    Ok(labels)
}

/// Encode a presentation-format name as uncompressed wire labels.
pub fn encode_name(name: &str) -> Result<Vec<u8>, ParseError> {
    let labels = name_to_labels(name);
    check_name_length(&labels)?;

    let mut encoded = Vec::with_capacity(name.len() + 2);
    for label in &labels {
        if label.len() > MAX_LABEL_LENGTH {
            return Err(ParseError::InvalidLabel);
        }
        encoded.push(label.len() as u8);
        encoded.extend_from_slice(label.as_bytes());
    }
    encoded.push(0);
    Ok(encoded)
}

/// Split `www.example.com.` into `["www", "example", "com"]`; `.` is empty.
pub fn name_to_labels(name: &str) -> Vec<String> {
    name.split('.')
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect()
}

/// Join labels back into a fully-qualified name with trailing dot.
pub fn labels_to_name(labels: &[String]) -> String {
    if labels.is_empty() {
        return ".".to_string();
    }
    let mut name = labels.join(".");
    name.push('.');
    name
}

fn check_name_length(labels: &[String]) -> Result<(), ParseError> {
    let wire_len: usize = labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1;
    if wire_len > MAX_NAME_LENGTH {
        return Err(ParseError::NameTooLong);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        let labels = name_to_labels("www.Example.com.");
        assert_eq!(labels, vec!["www", "Example", "com"]);
        assert_eq!(labels_to_name(&labels), "www.Example.com.");
        assert_eq!(labels_to_name(&[]), ".");
    }

    #[test]
    fn test_decode_compressed_name() {
        // "abc.com" at offset 0, then "www" + pointer to offset 0 at offset 9
        let packet = [
            3, b'a', b'b', b'c', 3, b'c', b'o', b'm', 0, 3, b'w', b'w', b'w', 0xC0, 0x00,
        ];
        let labels = decode_name_at(&packet, 9).unwrap();
        assert_eq!(labels, vec!["www", "abc", "com"]);
    }

    #[test]
    fn test_pointer_loop_is_rejected() {
        let packet = [0xC0, 0x00];
        assert!(decode_name_at(&packet, 0).is_err());
    }

    #[test]
    fn test_encode_rejects_long_label() {
        let long = "a".repeat(64);
        assert!(encode_name(&format!("{}.com.", long)).is_err());
        assert_eq!(encode_name(".").unwrap(), vec![0]);
    }
}

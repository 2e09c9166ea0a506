use bitstream_io::{BigEndian, BitReader, BitWriter};
use bucketdns::dns::DNSPacket;
use bucketdns::dns::common::PacketComponent;
use bucketdns::dns::enums::DNSResourceType;
use bucketdns::dns::header::DNSHeader;

fn write_header(header: &DNSHeader) -> Vec<u8> {
    let mut buffer = Vec::new();
    {
        let mut writer = BitWriter::<_, BigEndian>::new(&mut buffer);
        header.write(&mut writer).expect("Failed to write header");
    }
    buffer
}

#[test]
fn test_header_read_write_roundtrip() {
    let original = DNSHeader {
        id: 0xABCD,
        qr: true,
        opcode: 2,
        aa: true,
        tc: false,
        rd: true,
        ra: false,
        z: 0,
        rcode: 3,
        qdcount: 1,
        ancount: 2,
        nscount: 1,
        arcount: 0,
    };

    let buffer = write_header(&original);
    assert_eq!(buffer.len(), 12);

    let mut reader = BitReader::<_, BigEndian>::new(&buffer[..]);
    let mut parsed = DNSHeader::default();
    parsed
        .read(&mut reader, &buffer)
        .expect("Failed to read header");

    assert_eq!(parsed, original);
}

#[test]
fn test_header_flags_packing() {
    let header = DNSHeader {
        id: 0x1234,
        qr: true,    // bit 15
        opcode: 0xA, // bits 14-11 (1010)
        aa: true,    // bit 10
        tc: false,   // bit 9
        rd: true,    // bit 8
        ra: false,   // bit 7
        z: 0x5,      // bits 6-4 (101)
        rcode: 0xF,  // bits 3-0 (1111)
        ..Default::default()
    };

    let buffer = write_header(&header);

    assert_eq!(buffer[0], 0x12);
    assert_eq!(buffer[1], 0x34);
    assert_eq!(buffer[2], 0xD5); // QR=1, Opcode=1010, AA=1, TC=0, RD=1
    assert_eq!(buffer[3], 0x5F); // RA=0, Z=101, RCODE=1111
}

#[test]
fn test_truncated_flag_survives_serialization() {
    let mut reply = DNSPacket::reply_to(&DNSPacket::query(
        7,
        "abc.com.",
        DNSResourceType::TXT,
        true,
    ));
    reply.header.aa = true;

    let truncated = reply.truncated();
    let parsed = DNSPacket::parse(&truncated.serialize().unwrap()).unwrap();

    assert!(parsed.header.tc);
    assert!(parsed.header.aa);
    assert!(parsed.header.rd);
    assert_eq!(parsed.header.qdcount, 1);
    assert_eq!(parsed.header.ancount, 0);
    assert_eq!(parsed.questions[0].name(), "abc.com.");
}

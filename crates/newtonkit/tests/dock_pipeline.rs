use bytes::Bytes;
use newtonkit::dock::{
    Connection, DockEvent, DockPacket, PacketFramer, SessionKey, SessionState,
};
use newtonkit::mnp::{LinkFramer, LinkPacket};
use newtonkit::nsof::NewtonObject;
use newtonkit::Pipeline;

/// Link request as sent by a MessagePad.
const LINK_REQUEST: [u8; 48] = [
    0x16, 0x10, 0x02, 0x26, 0x01, 0x02, 0x01, 0x06, 0x01, 0x00, 0x00, 0x00, 0x00, 0xff, 0x02,
    0x01, 0x02, 0x03, 0x01, 0x08, 0x04, 0x02, 0x40, 0x00, 0x08, 0x01, 0x03, 0x09, 0x01, 0x01,
    0x0e, 0x04, 0x03, 0x04, 0x00, 0xfa, 0xc5, 0x06, 0x01, 0x04, 0x00, 0x00, 0xe1, 0x00, 0x10,
    0x03, 0xb9, 0xbf,
];

/// The device introducing itself as "Bastian Müller", link sequence 2.
const NEWTON_NAME: [u8; 119] = [
    0x16, 0x10, 0x02, 0x02, 0x04, 0x02, 0x6e, 0x65, 0x77, 0x74, 0x64, 0x6f, 0x63, 0x6b, 0x6e,
    0x61, 0x6d, 0x65, 0x00, 0x00, 0x00, 0x5a, 0x00, 0x00, 0x00, 0x38, 0xee, 0xe6, 0x53, 0x96,
    0x01, 0x00, 0x00, 0x00, 0x00, 0x72, 0x63, 0x77, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x80,
    0x00, 0x00, 0x10, 0x10, 0x00, 0x00, 0x00, 0x00, 0x01, 0x40, 0x00, 0x00, 0x00, 0xf0, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x1c, 0xe3, 0xa4, 0x1d, 0x00, 0x00, 0x00, 0x55,
    0x00, 0x00, 0x00, 0x55, 0x00, 0x00, 0x00, 0x01, 0x00, 0x42, 0x00, 0x61, 0x00, 0x73, 0x00,
    0x74, 0x00, 0x69, 0x00, 0x61, 0x00, 0x6e, 0x00, 0x20, 0x00, 0x4d, 0x00, 0xfc, 0x00, 0x6c,
    0x00, 0x6c, 0x00, 0x65, 0x00, 0x72, 0x00, 0x00, 0x00, 0x00, 0x10, 0x03, 0xc9, 0xf6,
];

/// Wrap a dock packet the way the device would send it.
fn device_transfer(seq: u8, packet: &DockPacket) -> Bytes {
    let data = PacketFramer::new().write(packet).unwrap();
    LinkFramer::new().write(&LinkPacket::Transfer { seq, data }.encode())
}

/// What the desktop sent, split into link packets and dock command codes.
#[derive(Debug, Default)]
struct Sent {
    link: Vec<LinkPacket>,
    dock: Vec<(String, Vec<u8>)>,
}

fn decode_output(output: &[u8]) -> Sent {
    let mut sent = Sent::default();
    let mut stream = Vec::new();
    LinkFramer::new()
        .read(output, |frame| {
            let packet = LinkPacket::decode(&frame)?;
            if let LinkPacket::Transfer { data, .. } = &packet {
                stream.extend_from_slice(data);
            }
            sent.link.push(packet);
            Ok::<_, newtonkit::mnp::MnpError>(())
        })
        .unwrap();

    let mut offset = 0;
    while offset < stream.len() {
        assert_eq!(&stream[offset..offset + 8], b"newtdock");
        let code = String::from_utf8(stream[offset + 8..offset + 12].to_vec()).unwrap();
        let length = u32::from_be_bytes(stream[offset + 12..offset + 16].try_into().unwrap());
        let start = offset + 16;
        let end = start + length as usize;
        sent.dock.push((code, stream[start..end].to_vec()));
        offset = end.next_multiple_of(4);
    }
    sent
}

fn commands(sent: &Sent) -> Vec<&str> {
    sent.dock.iter().map(|(code, _)| code.as_str()).collect()
}

fn acks(sent: &Sent) -> Vec<u8> {
    sent.link
        .iter()
        .filter_map(|packet| match packet {
            LinkPacket::Acknowledgement { seq, .. } => Some(*seq),
            _ => None,
        })
        .collect()
}

fn step(pipeline: &mut Pipeline, input: &[u8]) -> Sent {
    pipeline.receive(input).unwrap();
    decode_output(&pipeline.take_output())
}

/// Bring a pipeline up to a connected dock session.
fn dock(pipeline: &mut Pipeline) -> Vec<DockEvent> {
    step(pipeline, &LINK_REQUEST);
    step(
        pipeline,
        &device_transfer(
            1,
            &DockPacket::RequestToDock {
                protocol_version: 9,
            },
        ),
    );
    step(pipeline, &NEWTON_NAME);
    step(
        pipeline,
        &device_transfer(
            3,
            &DockPacket::NewtonInfo {
                protocol_version: 10,
                encrypted_key: SessionKey([0xff, 0x8d, 0xaa, 0xb8, 0x00, 0x20, 0x41, 0xd5]),
            },
        ),
    );
    step(
        pipeline,
        &device_transfer(4, &DockPacket::Result { error_code: 0 }),
    );
    step(
        pipeline,
        &device_transfer(
            5,
            &DockPacket::Password {
                key: SessionKey([0; 8]),
            },
        ),
    );
    pipeline.take_events()
}

#[test]
fn handshake_over_the_wire() {
    let mut pipeline = Pipeline::new().unwrap();

    let sent = step(&mut pipeline, &LINK_REQUEST);
    assert!(matches!(sent.link.as_slice(), [LinkPacket::Request(_)]));
    assert!(sent.dock.is_empty());

    let sent = step(
        &mut pipeline,
        &device_transfer(
            1,
            &DockPacket::RequestToDock {
                protocol_version: 9,
            },
        ),
    );
    assert_eq!(acks(&sent), vec![1]);
    assert_eq!(commands(&sent), vec!["dock"]);
    assert_eq!(sent.dock[0].1, vec![0, 0, 0, 0]);

    let sent = step(&mut pipeline, &NEWTON_NAME);
    assert_eq!(acks(&sent), vec![2]);
    assert_eq!(commands(&sent), vec!["dinf"]);
    assert_eq!(&sent.dock[0].1[..4], &[0, 0, 0, 10]);
    assert_eq!(
        &sent.dock[0].1[8..16],
        &[0x64, 0x23, 0xef, 0x02, 0xfb, 0xcd, 0xc5, 0xa5]
    );

    let sent = step(
        &mut pipeline,
        &device_transfer(
            3,
            &DockPacket::NewtonInfo {
                protocol_version: 10,
                encrypted_key: SessionKey([0xff, 0x8d, 0xaa, 0xb8, 0x00, 0x20, 0x41, 0xd5]),
            },
        ),
    );
    assert_eq!(commands(&sent), vec!["wicn"]);
    assert_eq!(sent.dock[0].1, vec![0, 0, 0, 63]);

    let sent = step(
        &mut pipeline,
        &device_transfer(4, &DockPacket::Result { error_code: 0 }),
    );
    assert_eq!(commands(&sent), vec!["stim"]);
    assert_eq!(sent.dock[0].1, vec![0, 0, 0, 60]);

    let sent = step(
        &mut pipeline,
        &device_transfer(
            5,
            &DockPacket::Password {
                key: SessionKey([0; 8]),
            },
        ),
    );
    assert_eq!(commands(&sent), vec!["pass"]);
    assert_eq!(
        sent.dock[0].1,
        vec![0xf6, 0xeb, 0xa1, 0x37, 0xf3, 0x69, 0x9e, 0xa5]
    );
    assert_eq!(pipeline.session().state(), SessionState::Connected);

    let events = pipeline.take_events();
    let Some(DockEvent::Connected {
        connection: Connection { name, .. },
    }) = events.last()
    else {
        panic!("expected a connected event, got {events:?}");
    };
    assert_eq!(name, "Bastian Müller");
}

#[test]
fn repeated_transfer_is_acked_not_redelivered() {
    let mut pipeline = Pipeline::new().unwrap();
    step(&mut pipeline, &LINK_REQUEST);
    let rtdk = device_transfer(
        1,
        &DockPacket::RequestToDock {
            protocol_version: 9,
        },
    );
    step(&mut pipeline, &rtdk);

    let sent = step(&mut pipeline, &rtdk);
    assert_eq!(acks(&sent), vec![1]);
    assert!(sent.dock.is_empty());
    assert_eq!(pipeline.session().state(), SessionState::InitiatedDocking);
}

#[test]
fn call_round_trip() {
    let mut pipeline = Pipeline::new().unwrap();
    dock(&mut pipeline);

    pipeline
        .session_mut()
        .call_global_function("Add", vec![1.into(), 2.into()])
        .unwrap();
    let sent = decode_output(&pipeline.take_output());
    assert_eq!(commands(&sent), vec!["cgfn"]);

    let sent = step(
        &mut pipeline,
        &device_transfer(
            6,
            &DockPacket::CallResult {
                result: NewtonObject::Integer(3),
            },
        ),
    );
    assert_eq!(commands(&sent), vec!["opdn"]);
    assert_eq!(
        pipeline.take_events(),
        vec![DockEvent::CallResult {
            result: NewtonObject::Integer(3)
        }]
    );
}

#[test]
fn local_disconnect_ends_dock_then_link() {
    let mut pipeline = Pipeline::new().unwrap();
    let events = dock(&mut pipeline);
    assert!(matches!(events.last(), Some(DockEvent::Connected { .. })));

    pipeline.disconnect().unwrap();
    let sent = decode_output(&pipeline.take_output());
    assert_eq!(commands(&sent), vec!["disc"]);
    assert!(matches!(
        sent.link.last(),
        Some(LinkPacket::Disconnect { reason: 0xff })
    ));
    assert!(matches!(
        pipeline.take_events().last(),
        Some(DockEvent::Disconnected { .. })
    ));
}

#[test]
fn out_of_order_dock_packet_drops_session() {
    let mut pipeline = Pipeline::new().unwrap();
    step(&mut pipeline, &LINK_REQUEST);
    step(
        &mut pipeline,
        &device_transfer(
            1,
            &DockPacket::RequestToDock {
                protocol_version: 9,
            },
        ),
    );

    let sent = step(
        &mut pipeline,
        &device_transfer(2, &DockPacket::Result { error_code: 0 }),
    );
    assert_eq!(commands(&sent), vec!["dres", "disc"]);
    assert_eq!(sent.dock[0].1, (-28028i32).to_be_bytes().to_vec());
    assert_eq!(pipeline.session().state(), SessionState::Disconnected);
}

#[test]
fn corrupted_frame_is_reported_and_stream_recovers() {
    let mut pipeline = Pipeline::new().unwrap();
    let mut bad = LINK_REQUEST;
    bad[47] ^= 0xff;
    assert!(pipeline.receive(&bad).is_err());

    let sent = step(&mut pipeline, &LINK_REQUEST);
    assert!(matches!(sent.link.as_slice(), [LinkPacket::Request(_)]));
}

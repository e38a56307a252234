use netdaq::codec::{
    AlarmConfig, AlarmLevel, CHANNEL_RECORD_SIZE, CONFIG_PACKET_SIZE, CONFIG_PAYLOAD_SIZE,
    ChannelConfig, ChannelId, ChannelKind, ConfigBlock, ConfigFlags, CurrentRange,
    EQUATION_TRAILER_SIZE, Interval, OhmsRange, RtdRange, ThermocoupleType, VdcRange,
};
use netdaq::equation::{EquationProgram, compile, decode_program};
use netdaq::protocol::{PacketFramer, frame};
use netdaq::{Command, Request};
use proptest::prelude::*;

/// Type codes the codec understands, except equations
const KNOWN_TYPES: [u32; 11] = [
    0x0000, 0x0001, 0x0002, 0x0004, 0x0008, 0x0010, 0x0020, 0x1_0002, 0x8001, 0x8002, 0x8003,
];

/// Every documented range code
const RANGE_CODES: [u32; 28] = [
    0x1001, 0x1102, 0x1204, 0x1308, 0x1410, 0x1520, 0x2001, 0x2102, 0x2308, 0x2410, 0x2520,
    0x2640, 0x3001, 0x3102, 0x3204, 0x3308, 0x6001, 0x6101, 0x6201, 0x6301, 0x6401, 0x6501,
    0x6601, 0x6701, 0x6801, 0x5020, 0x5021, 0x0000,
];

fn record_strategy() -> impl Strategy<Value = Vec<u8>> {
    (
        prop::sample::select(KNOWN_TYPES.to_vec()),
        prop_oneof![prop::sample::select(RANGE_CODES.to_vec()), any::<u32>()],
        prop::collection::vec(any::<u8>(), CHANNEL_RECORD_SIZE - 8),
    )
        .prop_map(|(type_code, range, rest)| {
            let mut record = Vec::with_capacity(CHANNEL_RECORD_SIZE);
            record.extend_from_slice(&type_code.to_be_bytes());
            record.extend_from_slice(&range.to_be_bytes());
            record.extend_from_slice(&rest);
            record
        })
}

fn config_with_two_equations() -> ConfigBlock {
    let mut block = ConfigBlock::new();
    let vdc = ChannelConfig::new(ChannelKind::Vdc {
        range: VdcRange::Auto,
    });
    for n in 1..=3 {
        block.set_channel(ChannelId::new(n).unwrap(), vdc.clone()).unwrap();
    }
    block
        .push_equation(ChannelId::new(21).unwrap(), compile("(C1 + C2 + C3) / 3").unwrap())
        .unwrap();
    block
        .push_equation(ChannelId::new(22).unwrap(), compile("sqrt(C1^2 + C2^2)").unwrap())
        .unwrap();
    block
}

proptest! {
    /// Records with documented type codes survive a lenient decode unchanged,
    /// whatever their remaining words hold
    #[test]
    fn prop_channel_record_is_lossless(record in record_strategy()) {
        let config = ChannelConfig::decode_lenient(&record).unwrap();
        let encoded = config.to_bytes();
        prop_assert_eq!(encoded.as_slice(), record.as_slice());
    }

    /// Strict decoding either agrees with lenient decoding or rejects the record
    #[test]
    fn prop_strict_is_lenient_or_error(record in record_strategy()) {
        let lenient = ChannelConfig::decode_lenient(&record).unwrap();
        match ChannelConfig::decode(&record) {
            Ok(strict) => prop_assert_eq!(strict.to_bytes(), lenient.to_bytes()),
            Err(_) => {
                let is_unrecognized = matches!(lenient.kind, ChannelKind::Unrecognized { .. });
                prop_assert!(is_unrecognized);
            }
        }
    }

    /// Arbitrary payloads never panic, and whenever they re-encode they do so
    /// byte for byte
    #[test]
    fn prop_config_block_lenient_roundtrip(
        bytes in prop::collection::vec(any::<u8>(), CONFIG_PAYLOAD_SIZE),
    ) {
        let block = ConfigBlock::decode_lenient(&bytes).unwrap();
        if let Ok(encoded) = block.encode() {
            prop_assert_eq!(encoded.as_ref(), bytes.as_slice());
        }
    }

    /// Decoded bytecode re-encodes to a prefix of its input
    #[test]
    fn prop_program_encodes_to_prefix(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let program = decode_program(&bytes);
        let encoded = program.encode();
        prop_assert!(encoded.len() <= bytes.len());
        prop_assert_eq!(encoded.as_ref(), &bytes[..encoded.len()]);
        if !program.is_malformed() {
            prop_assert_eq!(program.instructions().last(), Some(&netdaq::equation::Instruction::End));
        }
    }

    /// The framed SetConfig packet comes out whole wherever the stream splits
    #[test]
    fn prop_set_config_survives_any_split(split in 0usize..=CONFIG_PACKET_SIZE) {
        let request = Request::SetConfig(Box::new(config_with_two_equations()));
        let payload = request.encode_payload().unwrap();
        let mut wire = bytes::BytesMut::new();
        frame(9, request.command_id(), &payload, &mut wire);
        prop_assert_eq!(wire.len(), CONFIG_PACKET_SIZE);

        let mut framer = PacketFramer::new();
        let mut packets = framer.push(&wire[..split]).unwrap();
        packets.extend(framer.push(&wire[split..]).unwrap());
        prop_assert_eq!(packets.len(), 1);
        prop_assert_eq!(packets[0].command_id(), Command::SetConfig.as_u32());
        prop_assert_eq!(packets[0].total_length(), CONFIG_PACKET_SIZE);

        let decoded = Request::decode(packets[0].command_id(), packets[0].payload()).unwrap();
        prop_assert_eq!(decoded.encode_payload().unwrap(), payload);
    }
}

#[test]
fn set_config_packet_is_2508_bytes() {
    let request = Request::SetConfig(Box::new(config_with_two_equations()));
    let payload = request.encode_payload().unwrap();
    assert_eq!(payload.len(), 2492);

    let mut wire = bytes::BytesMut::new();
    frame(2, Command::SetConfig.as_u32(), &payload, &mut wire);
    assert_eq!(wire.len(), 2508);
    assert_eq!(&wire[..4], b"FELX");
    assert_eq!(&wire[12..16], &2508u32.to_be_bytes());
}

#[test]
fn fully_configured_block_roundtrips() {
    let mut block = config_with_two_equations();
    block.interval = Interval::from_duration(std::time::Duration::from_millis(500));
    block.set_flag(ConfigFlags::FAHRENHEIT, true);

    let ohms = ChannelConfig::new(ChannelKind::Ohms4W {
        range: OhmsRange::R300,
    })
    .with_calibration(2.0, -0.5);
    block.set_channel(ChannelId::new(4).unwrap(), ohms).unwrap();

    let rtd = ChannelConfig::new(ChannelKind::Rtd {
        range: RtdRange::Custom385,
        alpha: 0.003_85,
        r0: 100.0,
    })
    .with_alarm(AlarmConfig {
        use_as_trigger: false,
        alarm1: AlarmLevel::high(120.0).with_digital_out(3),
        alarm2: AlarmLevel::low(-10.0),
    });
    block.set_channel(ChannelId::new(5).unwrap(), rtd).unwrap();

    let thermocouple = ChannelConfig::new(ChannelKind::Thermocouple {
        range: ThermocoupleType::K,
        open_detect: true,
    });
    block
        .set_channel(ChannelId::new(6).unwrap(), thermocouple)
        .unwrap();

    let current = ChannelConfig::new(ChannelKind::Current {
        range: CurrentRange::Ma100,
        shunt: 50.0,
    });
    block.set_channel(ChannelId::new(7).unwrap(), current).unwrap();

    block
        .set_channel(
            ChannelId::new(23).unwrap(),
            ChannelConfig::new(ChannelKind::ADiffAverage { a: 1, mask: 0b110 }),
        )
        .unwrap();

    let bytes = block.encode().unwrap();
    let strict = ConfigBlock::decode(&bytes).unwrap();
    let lenient = ConfigBlock::decode_lenient(&bytes).unwrap();
    assert_eq!(strict, lenient);
    assert_eq!(strict.encode().unwrap(), bytes);

    assert_eq!(strict.interval.milliseconds, 500);
    assert!(strict.flags.has(ConfigFlags::FAHRENHEIT));
    assert_eq!(strict.channel(ChannelId::new(5).unwrap()).alarm.alarm1.digital_out_mask, 0b1000);
    assert_eq!(
        strict.equation(ChannelId::new(22).unwrap()).unwrap().to_string(),
        "PUSH_CHANNEL C1; PUSH_CONST 2; POW; PUSH_CHANNEL C2; PUSH_CONST 2; POW; ADD; SQRT; END"
    );
    assert_eq!(strict.equation_trailer().len(), EQUATION_TRAILER_SIZE);
}

#[test]
fn unknown_channel_type_needs_lenient_decoding() {
    let mut bytes = ConfigBlock::new().encode().unwrap().to_vec();
    // type word of channel 3
    let record = 52 + 2 * CHANNEL_RECORD_SIZE;
    bytes[record..record + 4].copy_from_slice(&0x0000_0040_u32.to_be_bytes());
    bytes[record + 8] = 0x5A;

    assert!(ConfigBlock::decode(&bytes).is_err());

    let block = ConfigBlock::decode_lenient(&bytes).unwrap();
    assert_eq!(
        block.channel(ChannelId::new(3).unwrap()).kind,
        ChannelKind::Unrecognized { type_code: 0x40 }
    );
    assert_eq!(block.encode().unwrap().as_ref(), bytes.as_slice());
}

#[test]
fn unterminated_equation_is_kept() {
    let program = EquationProgram::new(vec![netdaq::equation::Instruction::PushChannel(1)]);
    assert!(program.is_malformed());

    let mut block = ConfigBlock::new();
    block.push_equation(ChannelId::new(30).unwrap(), program.clone()).unwrap();
    let decoded = ConfigBlock::decode(&block.encode().unwrap()).unwrap();
    let restored = decoded.equation(ChannelId::new(30).unwrap()).unwrap();
    // The zero padding after the program reads as End
    assert!(!restored.is_malformed());
    assert_eq!(&restored.instructions()[..1], program.instructions());
}

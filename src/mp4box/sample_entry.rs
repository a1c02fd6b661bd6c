//! Sample entries found in `stsd`, and the codec configuration atoms nested
//! inside them.

use super::{add_generated, atoms};
use crate::property::{BytesLength, FloatFormat, Property, StringFormat};
use crate::{Atom, FourCC, Registry, Result};

pub(crate) fn register(registry: &mut Registry) {
    atoms!(registry, {
        b"mp4a" => mp4a,
        b"esds" => esds,
        b"avc1" => avc1,
        b"avcC" => avcc,
        b"ac-3" => ac3,
        b"dac3" => dac3,
        b"btrt" => btrt,
        b"pasp" => pasp,
    });
    atoms!(registry, in b"avc1" {
        b"colr" => colr,
    });
}

/// The eight bytes every sample entry starts with.
fn sample_entry(kind: FourCC) -> Atom {
    Atom::container(kind)
        .with_property(Property::reserved("reserved1", 6))
        .with_property(Property::uint("dataReferenceIndex", 2).default_integer(1))
}

/// MPEG-4 audio. `timeScale` is the integer part of the 16.16 sample rate.
/// QuickTime sound version 1 adds four more 32-bit fields.
fn mp4a(kind: FourCC) -> Atom {
    let v1 = |name: &'static str| Property::uint(name, 4).present_if("soundVersion", u64::MAX, 1);
    sample_entry(kind)
        .with_property(Property::uint("soundVersion", 2))
        .with_property(Property::reserved("reserved2", 6))
        .with_property(Property::uint("channels", 2).default_integer(2))
        .with_property(Property::uint("sampleSize", 2).default_integer(16))
        .with_property(Property::uint("compressionId", 2))
        .with_property(Property::uint("packetSize", 2))
        .with_property(Property::uint("timeScale", 2).default_integer(48000))
        .with_property(Property::reserved("reserved3", 2))
        .with_property(v1("samplesPerPacket"))
        .with_property(v1("bytesPerPacket"))
        .with_property(v1("framesPerPacket"))
        .with_property(v1("bytesPerSample"))
}

/// Elementary stream descriptor, kept as raw descriptor bytes.
fn esds(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_version_and_flags()
        .with_property(Property::blob("descriptors", BytesLength::Remaining))
}

fn avc1(kind: FourCC) -> Atom {
    sample_entry(kind)
        .with_property(Property::reserved("reserved2", 16))
        .with_property(Property::uint("width", 2))
        .with_property(Property::uint("height", 2))
        .with_property(
            Property::fixed("horizontalResolution", FloatFormat::Fixed16_16).default_float(72.0),
        )
        .with_property(
            Property::fixed("verticalResolution", FloatFormat::Fixed16_16).default_float(72.0),
        )
        .with_property(Property::reserved("reserved3", 4))
        .with_property(Property::uint("frameCount", 2).default_integer(1))
        .with_property(Property::text("compressorName", StringFormat::Counted(Some(32))))
        .with_property(Property::uint("depth", 2).default_integer(0x18))
        .with_property(Property::uint("colorTableId", 2).default_integer(0xFFFF))
}

/// H.264 decoder configuration record: parameter sets are length-prefixed
/// NAL units, counted by 5-bit and 8-bit fields respectively.
fn avcc(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_property(Property::uint("configurationVersion", 1).default_integer(1))
        .with_property(Property::uint("AVCProfileIndication", 1))
        .with_property(Property::uint("profile_compatibility", 1))
        .with_property(Property::uint("AVCLevelIndication", 1))
        .with_property(Property::bitfield("reserved", 6).default_integer(0x3F).read_only())
        .with_property(Property::bitfield("lengthSizeMinusOne", 2).default_integer(3))
        .with_property(Property::bitfield("reserved1", 3).default_integer(0x7).read_only())
        .with_property(Property::bitfield("numOfSequenceParameterSets", 5))
        .with_property(Property::table(
            "sequenceEntries",
            "numOfSequenceParameterSets",
            vec![
                Property::uint("sequenceParameterSetLength", 2).read_only(),
                Property::blob(
                    "sequenceParameterSetNALUnit",
                    BytesLength::Field("sequenceParameterSetLength"),
                ),
            ],
        ))
        .with_property(Property::uint("numOfPictureParameterSets", 1))
        .with_property(Property::table(
            "pictureEntries",
            "numOfPictureParameterSets",
            vec![
                Property::uint("pictureParameterSetLength", 2).read_only(),
                Property::blob(
                    "pictureParameterSetNALUnit",
                    BytesLength::Field("pictureParameterSetLength"),
                ),
            ],
        ))
}

/// AC-3 audio sample entry. A generated entry describes 48 kHz stereo with a
/// matching `dac3` child.
fn ac3(kind: FourCC) -> Atom {
    sample_entry(kind)
        .with_property(Property::reserved("reserved2", 8))
        .with_property(Property::uint("channelCount", 2).default_integer(2))
        .with_property(Property::uint("sampleSize", 2).default_integer(16))
        .with_property(Property::reserved("reserved3", 4))
        .with_property(Property::uint("samplingRate", 2).default_integer(48000))
        .with_property(Property::reserved("reserved4", 2))
        .with_generator(generate_ac3)
}

fn generate_ac3(ac3: &mut Atom) -> Result<()> {
    add_generated(ac3, dac3, b"dac3")
}

/// AC-3 specific box. Generated defaults: 48 kHz, bsid 8, 3/2 channels with
/// LFE, bit rate code 10. Callers describing a real stream set the fields
/// from its bitstream header.
fn dac3(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_property(Property::bitfield("fscod", 2))
        .with_property(Property::bitfield("bsid", 5).default_integer(8))
        .with_property(Property::bitfield("bsmod", 3))
        .with_property(Property::bitfield("acmod", 3).default_integer(7))
        .with_property(Property::bitfield("lfeon", 1).default_integer(1))
        .with_property(Property::bitfield("bit_rate_code", 5).default_integer(10))
        .with_property(Property::bitfield("reserved", 5).read_only())
}

/// Colour information. The indices belong to the `nclc` and `nclx` forms;
/// anything after them is kept as trailing bytes.
fn colr(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_property(
            Property::text("colorParameterType", StringFormat::Fixed(4)).default_bytes(b"nclc"),
        )
        .with_property(Property::uint("primariesIndex", 2).default_integer(1))
        .with_property(Property::uint("transferFunctionIndex", 2).default_integer(1))
        .with_property(Property::uint("matrixIndex", 2).default_integer(1))
}

fn pasp(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_property(Property::uint("hSpacing", 4).default_integer(1))
        .with_property(Property::uint("vSpacing", 4).default_integer(1))
}

fn btrt(kind: FourCC) -> Atom {
    Atom::leaf(kind)
        .with_property(Property::uint("bufferSizeDB", 4))
        .with_property(Property::uint("maxBitrate", 4))
        .with_property(Property::uint("avgBitrate", 4))
}

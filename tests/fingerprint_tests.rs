use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use sha2::{Digest, Sha256};

use fingerprint::hardware::{AttributeSource, DiskSerialSource};
use fingerprint::measurement::MeasurementSource;
use fingerprint::tpm::{DeviceChannel, PcrReader, PCR_READ_RESPONSE_SIZE};
use fingerprint::{Category, Fingerprint, MeasurementFlags};

/// Attribute lookups answered from a fixed table.
#[derive(Clone, Default)]
struct StubAttributes {
    values: HashMap<(&'static str, &'static str), Vec<String>>,
    queries: Arc<AtomicUsize>,
}

impl StubAttributes {
    fn with(mut self, class: &'static str, property: &'static str, values: &[&str]) -> Self {
        self.values.insert(
            (class, property),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }
}

impl AttributeSource for StubAttributes {
    fn query(&self, source: &MeasurementSource) -> Vec<String> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.values
            .get(&(source.class, source.property))
            .cloned()
            .unwrap_or_default()
    }
}

struct StubDisk(Option<&'static str>);

impl DiskSerialSource for StubDisk {
    fn system_drive_serial(&self) -> Option<String> {
        self.0.map(str::to_string)
    }
}

/// TPM device that answers every PCR read with a fixed digest.
struct StubTpm {
    available: bool,
    broken_transport: bool,
    digest: [u8; 20],
    commands: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl StubTpm {
    fn healthy() -> Self {
        let mut digest = [0u8; 20];
        for (i, b) in digest.iter_mut().enumerate() {
            *b = i as u8;
        }
        Self {
            available: true,
            broken_transport: false,
            digest,
            commands: Arc::default(),
        }
    }

    fn missing() -> Self {
        Self {
            available: false,
            ..Self::healthy()
        }
    }

    /// Opens fine, but every command fails in transport.
    fn broken() -> Self {
        Self {
            broken_transport: true,
            ..Self::healthy()
        }
    }
}

impl DeviceChannel for StubTpm {
    type Handle = ();

    fn open(&mut self) -> io::Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, "no TPM"))
        }
    }

    fn submit(&mut self, _: &mut (), command: &[u8], response_size: usize) -> io::Result<Vec<u8>> {
        assert_eq!(response_size, PCR_READ_RESPONSE_SIZE);
        self.commands.lock().unwrap().push(command.to_vec());
        if self.broken_transport {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "TPM went away"));
        }

        let mut response = vec![0x00, 0xc4, 0x00, 0x00, 0x00, 0x1e, 0x00, 0x00, 0x00, 0x00];
        response.extend_from_slice(&self.digest);
        Ok(response)
    }

    fn close(&mut self, _: ()) {}
}

const TPM_DIGEST_HEX: &str = "000102030405060708090A0B0C0D0E0F10111213";
const HDD_SERIAL: &str = "WD-WCC4N0000000";

fn known_attributes() -> StubAttributes {
    StubAttributes::default()
        .with("Win32_BaseBoard", "Model", &["BB-MODEL"])
        .with("Win32_BaseBoard", "Manufacturer", &["BB-VENDOR"])
        .with("Win32_BaseBoard", "Name", &["Base Board"])
        .with("Win32_BaseBoard", "SerialNumber", &["BB-SERIAL"])
        .with("Win32_BIOS", "Manufacturer", &["BIOS-VENDOR"])
        .with("Win32_BIOS", "IdentificationCode", &["BIOS-ID"])
        .with("Win32_BIOS", "SerialNumber", &["BIOS-SERIAL"])
        .with("Win32_Processor", "UniqueId", &["CPU-UID"])
        .with("Win32_Processor", "ProcessorId", &["BFEBFBFF000906EA"])
        .with("Win32_Processor", "Name", &["Intel(R) Core(TM) i7-8700"])
        .with("Win32_Processor", "Manufacturer", &["GenuineIntel"])
        .with("Win32_OperatingSystem", "SerialNumber", &["00330-80000-00000-AA123"])
        .with("Win32_ComputerSystemProduct", "UUID", &["4C4C4544-0042-3510-8052-B4C04F565032"])
        .with("Win32_VideoController", "PNPDeviceID", &["PCI\\VEN_10DE&DEV_1C82"])
        .with(
            "Win32_NetworkAdapterConfiguration",
            "MACAddress",
            &["AA:BB:CC:DD:EE:01", "AA:BB:CC:DD:EE:02"],
        )
}

fn known_lines() -> Vec<&'static str> {
    vec![
        "BB-MODEL",
        "BB-VENDOR",
        "Base Board",
        "BB-SERIAL",
        "BIOS-VENDOR",
        "BIOS-ID",
        "BIOS-SERIAL",
        "CPU-UID",
        "BFEBFBFF000906EA",
        "Intel(R) Core(TM) i7-8700",
        "GenuineIntel",
        "00330-80000-00000-AA123",
        "4C4C4544-0042-3510-8052-B4C04F565032",
        "PCI\\VEN_10DE&DEV_1C82",
        "AA:BB:CC:DD:EE:01",
        "AA:BB:CC:DD:EE:02",
    ]
}

fn expected_digest(lines: &[&str]) -> String {
    let text: String = lines.iter().map(|l| format!("{l}\r\n")).collect();
    hex::encode_upper(Sha256::digest(text.as_bytes()))
}

fn engine(attributes: StubAttributes, disk: Option<&'static str>, tpm: StubTpm) -> Fingerprint {
    Fingerprint::new(attributes, StubDisk(disk), PcrReader::new(tpm))
}

#[test]
fn all_measurements_match_known_concatenation() {
    let mut fp = engine(known_attributes(), Some(HDD_SERIAL), StubTpm::healthy());

    let mut lines = known_lines();
    lines.push(TPM_DIGEST_HEX);
    lines.push(HDD_SERIAL);

    assert_eq!(fp.generate().unwrap(), expected_digest(&lines));
    assert_eq!(fp.flags(), MeasurementFlags::all());
}

#[test]
fn repeated_generation_is_deterministic() {
    let mut fp = engine(known_attributes(), Some(HDD_SERIAL), StubTpm::healthy());
    let mut other = engine(known_attributes(), Some(HDD_SERIAL), StubTpm::healthy());

    let first = fp.generate().unwrap();
    assert_eq!(first.len(), 64);
    assert!(first.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    assert_eq!(fp.generate().unwrap(), first);
    assert_eq!(other.generate().unwrap(), first);
}

#[test]
fn category_order_changes_digest() {
    let mut canonical = engine(known_attributes(), None, StubTpm::missing());
    let mut swapped = engine(known_attributes(), None, StubTpm::missing()).with_order(&[
        Category::Bios,
        Category::Baseboard,
        Category::Cpu,
        Category::OsSerial,
        Category::SystemUuid,
        Category::Video,
        Category::ActiveNics,
    ]);

    assert_ne!(canonical.generate().unwrap(), swapped.generate().unwrap());
}

#[test]
fn disabling_a_category_removes_its_lines() {
    let mut fp = engine(known_attributes(), None, StubTpm::healthy());
    fp.set_measure(Category::Tpm, false);
    fp.set_measure(Category::HddSerial, false);
    let before = fp.generate().unwrap();
    assert_eq!(before, expected_digest(&known_lines()));

    fp.set_measure(Category::Video, false);
    let after = fp.generate().unwrap();
    assert_ne!(before, after);

    let without_video: Vec<&str> = known_lines()
        .into_iter()
        .filter(|l| !l.starts_with("PCI\\"))
        .collect();
    assert_eq!(after, expected_digest(&without_video));

    fp.set_measure(Category::Video, true);
    assert_eq!(fp.generate().unwrap(), before);
}

#[test]
fn disabling_a_silent_category_keeps_digest() {
    let attributes = StubAttributes::default().with("Win32_BIOS", "SerialNumber", &["ONLY"]);
    let mut fp = engine(attributes, Some(HDD_SERIAL), StubTpm::healthy());
    let before = fp.generate().unwrap();

    fp.set_measure(Category::Cpu, false);
    assert!(fp.is_stale());
    assert_eq!(fp.generate().unwrap(), before);
}

#[test]
fn absent_values_add_no_blank_lines() {
    let attributes = StubAttributes::default()
        .with("Win32_BaseBoard", "SerialNumber", &["BB-SERIAL"])
        .with("Win32_BIOS", "IdentificationCode", &[""])
        .with("Win32_ComputerSystemProduct", "UUID", &["UUID-1"]);
    let mut fp = engine(attributes, None, StubTpm::missing());

    assert_eq!(fp.generate().unwrap(), expected_digest(&["BB-SERIAL", "UUID-1"]));
}

#[test]
fn missing_tpm_disables_itself_without_error() {
    let mut fp = engine(known_attributes(), Some(HDD_SERIAL), StubTpm::missing());

    let mut lines = known_lines();
    lines.push(HDD_SERIAL);
    let expected = expected_digest(&lines);

    assert_eq!(fp.generate().unwrap(), expected);
    assert!(!fp.measures(Category::Tpm));
    assert!(fp.measures(Category::HddSerial));

    assert_eq!(fp.generate().unwrap(), expected);
    assert!(!fp.measures(Category::Tpm));
}

#[test]
fn missing_drive_serial_disables_itself() {
    let mut fp = engine(known_attributes(), None, StubTpm::healthy());

    let mut lines = known_lines();
    lines.push(TPM_DIGEST_HEX);

    assert_eq!(fp.generate().unwrap(), expected_digest(&lines));
    assert!(!fp.measures(Category::HddSerial));
    assert!(fp.measures(Category::Tpm));
}

#[test]
fn empty_drive_serial_counts_as_missing() {
    let mut fp = engine(known_attributes(), Some(""), StubTpm::missing());
    let report = fp.generate_report().unwrap();
    assert_eq!(report.unavailable, vec![Category::Tpm, Category::HddSerial]);
}

#[test]
fn report_leaves_flags_untouched() {
    let mut fp = engine(known_attributes(), None, StubTpm::missing());

    let report = fp.generate_report().unwrap();
    assert_eq!(report.unavailable, vec![Category::Tpm, Category::HddSerial]);
    assert_eq!(report.digest, expected_digest(&known_lines()));
    assert_eq!(fp.flags(), MeasurementFlags::all());
}

#[test]
fn digest_is_cached_until_a_flag_changes() {
    let attributes = known_attributes();
    let queries = Arc::clone(&attributes.queries);
    let mut fp = engine(attributes, Some(HDD_SERIAL), StubTpm::healthy());
    assert!(fp.is_stale());

    let first = fp.generate().unwrap();
    let after_first = queries.load(Ordering::SeqCst);
    assert_eq!(after_first, fp.sources().len());
    assert!(!fp.is_stale());

    assert_eq!(fp.generate().unwrap(), first);
    assert_eq!(queries.load(Ordering::SeqCst), after_first);

    // Re-asserting the same value still invalidates.
    fp.set_measure(Category::Cpu, true);
    assert!(fp.is_stale());
    assert_eq!(fp.generate().unwrap(), first);
    assert_eq!(queries.load(Ordering::SeqCst), after_first * 2);
}

#[test]
fn non_ascii_values_hash_as_question_marks() {
    let attributes = StubAttributes::default().with("Win32_BaseBoard", "Manufacturer", &["Gérard"]);
    let mut fp = engine(attributes, None, StubTpm::missing());
    assert_eq!(fp.generate().unwrap(), expected_digest(&["G?rard"]));
}

#[test]
fn reads_configured_pcr() {
    let tpm = StubTpm::healthy();
    let commands = Arc::clone(&tpm.commands);
    let mut fp = Fingerprint::new(StubAttributes::default(), StubDisk(None), PcrReader::new(tpm))
        .with_pcr_index(7)
        .unwrap();

    assert_eq!(fp.generate().unwrap(), expected_digest(&[TPM_DIGEST_HEX]));
    assert_eq!(
        hex::encode(&commands.lock().unwrap()[0]),
        "00c10000000e0000001500000007"
    );
}

#[test]
fn rejects_invalid_pcr_index() {
    let result = Fingerprint::new(StubAttributes::default(), StubDisk(None), PcrReader::new(StubTpm::healthy()))
        .with_pcr_index(24);
    assert!(result.is_err());
}

#[test]
fn closed_tpm_is_reported_unavailable() {
    let mut fp = engine(known_attributes(), Some(HDD_SERIAL), StubTpm::healthy());
    fp.close_tpm();

    let report = fp.generate_report().unwrap();
    assert_eq!(report.unavailable, vec![Category::Tpm]);
    assert_eq!(report.digest.len(), fingerprint::fingerprint::DIGEST_HEX_LEN);
}

#[test]
fn failed_tpm_submission_disables_tpm() {
    let tpm = StubTpm::broken();
    let commands = Arc::clone(&tpm.commands);
    let mut fp = engine(known_attributes(), Some(HDD_SERIAL), tpm);

    let mut lines = known_lines();
    lines.push(HDD_SERIAL);
    let expected = expected_digest(&lines);

    assert_eq!(fp.generate().unwrap(), expected);
    assert!(!fp.measures(Category::Tpm));
    assert!(fp.measures(Category::HddSerial));

    // The channel is closed, so re-enabling the TPM does not reach the device again.
    fp.set_measure(Category::Tpm, true);
    assert_eq!(fp.generate().unwrap(), expected);
    assert_eq!(commands.lock().unwrap().len(), 1);
}

#[test]
fn engine_can_be_shared_across_threads() {
    let fp = engine(known_attributes(), Some(HDD_SERIAL), StubTpm::healthy());
    let shared = Arc::new(Mutex::new(fp));

    let mut lines = known_lines();
    lines.push(TPM_DIGEST_HEX);
    lines.push(HDD_SERIAL);
    let expected = expected_digest(&lines);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || shared.lock().unwrap().generate().unwrap())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }

    let mut fp = shared.lock().unwrap();
    fp.set_measure(Category::Video, false);
    assert!(fp.is_stale());
}

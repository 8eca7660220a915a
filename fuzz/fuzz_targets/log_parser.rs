#![no_main]

use libfuzzer_sys::fuzz_target;
use tli_analyzer::correlator::ChainCorrelator;
use tli_analyzer::log_parser::LogParser;
use tli_analyzer::log_record::LogFormat;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Any input must parse or be rejected without panicking, and whatever
        // parses must be safe to correlate in any order
        for format in [LogFormat::Systemd, LogFormat::Raw] {
            let parser = LogParser::new(format);
            let records = input.lines().filter_map(|line| parser.parse_line(line));
            let _ = ChainCorrelator::correlate(records, true);
        }
    }
});

use std::io::Write;
use testprof_common::ProfileData;

/// Callgrind exporter for call-graph rendering
///
/// gprof2dot reads this format (`gprof2dot -f callgrind`). Costs are inline
/// time in microseconds per function and inclusive time per call edge.
/// Functions are named `file:line(name)` so that equally named functions in
/// different files stay separate nodes.
pub struct CallgrindExporter<'a> {
    data: &'a ProfileData,
}

impl<'a> CallgrindExporter<'a> {
    pub fn new(data: &'a ProfileData) -> Self {
        Self { data }
    }

    /// Write the profile in callgrind format.
    pub fn export<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writeln!(writer, "# callgrind format")?;
        writeln!(writer, "version: 1")?;
        writeln!(writer, "creator: testprof")?;
        writeln!(writer, "positions: line")?;
        writeln!(writer, "events: Microseconds")?;

        let callees = self.data.callees();
        for (key, profile) in self.data.functions() {
            writeln!(writer)?;
            writeln!(writer, "fl={}", key.file)?;
            writeln!(writer, "fn={key}")?;
            writeln!(writer, "{} {}", key.line, micros(profile.stats.inline_time))?;

            // Outgoing edges of this function
            let Some(edges) = callees.get(key) else {
                continue;
            };
            for (callee, edge) in edges {
                writeln!(writer, "cfl={}", callee.file)?;
                writeln!(writer, "cfn={callee}")?;
                writeln!(writer, "calls={} {}", edge.total_calls, callee.line)?;
                writeln!(writer, "{} {}", key.line, micros(edge.cumulative_time))?;
            }
        }
        writer.flush()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn micros(secs: f64) -> u64 {
    (secs.max(0.0) * 1_000_000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use testprof_common::{CallStats, FunctionKey};

    #[test]
    fn test_export_functions_and_edges() {
        let main = FunctionKey::new("src/main.rs", 1, "main");
        let parse = FunctionKey::new("src/lib.rs", 12, "parse");
        let mut data = ProfileData::new();
        data.entry_mut(main.clone()).stats =
            CallStats { primitive_calls: 1, total_calls: 1, inline_time: 0.001, cumulative_time: 0.004 };
        let entry = data.entry_mut(parse.clone());
        entry.stats = CallStats { primitive_calls: 3, total_calls: 3, inline_time: 0.003, cumulative_time: 0.003 };
        entry.callers.insert(main, entry.stats);

        let mut out = Vec::new();
        CallgrindExporter::new(&data).export(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("# callgrind format\n"));
        assert!(text.contains("fn=src/lib.rs:12(parse)\n12 3000\n"));
        assert!(text.contains(
            "fn=src/main.rs:1(main)\n1 1000\ncfl=src/lib.rs\ncfn=src/lib.rs:12(parse)\ncalls=3 12\n1 3000\n"
        ));
    }

    #[test]
    fn test_empty_profile_has_header_only() {
        let mut out = Vec::new();
        CallgrindExporter::new(&ProfileData::new()).export(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 5);
    }
}

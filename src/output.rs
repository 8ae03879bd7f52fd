use crate::particle_store::Agent;
use anyhow::{Context, Result};
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use swarm_common::{Snapshot, DEFAULT_SNAPSHOT_FORMAT};

/// Snapshot container formats understood by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Json,
    /// `u32` snapshot count followed by each snapshot; the visualizer's input.
    Bincode,
    MessagePack,
}

impl SnapshotFormat {
    pub fn parse(name: Option<&str>) -> Result<Self> {
        match name.unwrap_or(DEFAULT_SNAPSHOT_FORMAT) {
            "json" => Ok(SnapshotFormat::Json),
            "bincode" => Ok(SnapshotFormat::Bincode),
            "messagepack" => Ok(SnapshotFormat::MessagePack),
            other => anyhow::bail!("Unknown output format: {}", other),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SnapshotFormat::Json => "json",
            SnapshotFormat::Bincode => "bin",
            SnapshotFormat::MessagePack => "msgpack",
        }
    }
}

/// Writes `<base>_snapshots.<ext>` and returns its path.
pub fn write_snapshots(base: &Path, format: SnapshotFormat, snapshots: &[Snapshot]) -> Result<PathBuf> {
    let path = PathBuf::from(format!("{}_snapshots.{}", base.display(), format.extension()));
    let file = File::create(&path).with_context(|| format!("Error creating snapshot file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);

    match format {
        SnapshotFormat::Json => {
            serde_json::to_writer(&mut writer, snapshots).context("Error serializing snapshots to JSON")?;
        }
        SnapshotFormat::Bincode => {
            bincode::serialize_into(&mut writer, &(snapshots.len() as u32))
                .context("Error writing snapshot count")?;
            for snapshot in snapshots {
                bincode::serialize_into(&mut writer, snapshot).context("Error serializing snapshot to bincode")?;
            }
        }
        SnapshotFormat::MessagePack => {
            rmp_serde::encode::write(&mut writer, snapshots).context("Error serializing snapshots to MessagePack")?;
        }
    }
    writer.flush()?;
    info!("{} snapshots saved to {} ({:?})", snapshots.len(), path.display(), format);
    Ok(path)
}

/// Writes one CSV row per agent: `x,y,heading,speed,species`.
pub fn write_positions_csv(path: &Path, agents: &[Agent]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Error creating CSV file '{}'", path.display()))?;
    for agent in agents {
        writer.serialize(agent)?;
    }
    writer.flush()?;
    info!("Final positions of {} agents saved to {}", agents.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;
    use swarm_common::{AutoColorRange, ColorSource};

    fn snapshot(tick: u64) -> Snapshot {
        Snapshot {
            tick,
            time: tick as f32 * 0.5,
            active_count: 3,
            target_count: 10,
            color_range: AutoColorRange::default(),
            color_source: ColorSource::Heading,
            mean_speed: 1.5,
            mean_luminance: 0.25,
            trail_width: 2,
            trail_height: 1,
            trail_channels: 1,
            trail: Some(vec![0.0, 1.0]),
            positions: None,
        }
    }

    #[test]
    fn bincode_stream_starts_with_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path().join("run");
        let path = write_snapshots(&base, SnapshotFormat::Bincode, &[snapshot(0), snapshot(4)]).expect("write");
        assert!(path.ends_with("run_snapshots.bin"));

        let mut reader = BufReader::new(File::open(&path).expect("open"));
        let count: u32 = bincode::deserialize_from(&mut reader).expect("count");
        assert_eq!(count, 2);
        let first: Snapshot = bincode::deserialize_from(&mut reader).expect("first");
        let second: Snapshot = bincode::deserialize_from(&mut reader).expect("second");
        assert_eq!(first.tick, 0);
        assert_eq!(second.tick, 4);
        assert_eq!(second.trail, Some(vec![0.0, 1.0]));
        assert!(second.positions.is_none());
    }

    #[test]
    fn json_and_messagepack_hold_the_full_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path().join("run");
        let snaps = [snapshot(1), snapshot(2), snapshot(3)];

        let json = write_snapshots(&base, SnapshotFormat::Json, &snaps).expect("json");
        let parsed: Vec<Snapshot> = serde_json::from_reader(File::open(json).expect("open")).expect("parse");
        assert_eq!(parsed.len(), 3);

        let msgpack = write_snapshots(&base, SnapshotFormat::MessagePack, &snaps).expect("msgpack");
        let parsed: Vec<Snapshot> = rmp_serde::decode::from_read(File::open(msgpack).expect("open")).expect("parse");
        assert_eq!(parsed[2].tick, 3);
    }

    #[test]
    fn format_names() {
        assert_eq!(SnapshotFormat::parse(None).expect("default"), SnapshotFormat::Bincode);
        let configured = swarm_common::OutputConfig::default().format;
        assert_eq!(SnapshotFormat::parse(configured.as_deref()).expect("configured"), SnapshotFormat::parse(None).expect("default"));
        assert_eq!(SnapshotFormat::parse(Some("messagepack")).expect("mp"), SnapshotFormat::MessagePack);
        assert!(SnapshotFormat::parse(Some("xml")).is_err());
    }

    #[test]
    fn csv_has_header_and_one_row_per_agent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("positions.csv");
        let agents = [
            Agent { x: 1.0, y: 2.0, heading: 0.5, speed: 3.0, species: 0 },
            Agent { x: 4.0, y: 5.0, heading: -0.5, speed: 6.0, species: 1 },
        ];
        write_positions_csv(&path, &agents).expect("csv");
        let mut reader = csv::Reader::from_path(&path).expect("reader");
        let headers = reader.headers().expect("headers").clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["x", "y", "heading", "speed", "species"]);
        let rows: Vec<Agent> = reader.deserialize().map(|r| r.expect("row")).collect();
        assert_eq!(rows, agents);
    }
}

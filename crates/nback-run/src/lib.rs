use anyhow::{bail, ensure, Context, Result};
use chrono::NaiveDateTime;
use csv::WriterBuilder;
use log::info;
use nback_lib::io::eye::EYE_DATA_HEADER;
use rand::{seq::index, seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const MAIN_HEADER: [&str; 10] = [
    "Participant ID",
    "Run ID",
    "Timestamp",
    "Stimulus",
    "N-back Level",
    "Lighting Condition",
    "N-back Sequence",
    "Key Press",
    "Response Time",
    "Key Duration",
];

const ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Session layout and sequence parameters, usually read from a TOML design file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionDesign {
    pub trials: usize,
    pub targets: usize,
    pub sequence_length: usize,
    /// Block levels per trial, e.g. `[1, 2, 3]`.
    pub levels: Vec<u32>,
}

impl Default for SessionDesign {
    fn default() -> Self {
        Self {
            trials: 5,
            targets: 10,
            sequence_length: 70,
            levels: vec![1, 2, 3],
        }
    }
}

pub fn read_design(path: &Path) -> Result<SessionDesign> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read design {}", path.display()))?;
    let design: SessionDesign =
        toml::from_str(&contents).with_context(|| format!("parsing design {}", path.display()))?;
    ensure!(design.trials > 0, "design needs at least one trial");
    ensure!(
        design.levels.iter().all(|&n| n > 0),
        "N-back levels must be positive"
    );
    Ok(design)
}

/// Letters of one N-back block and the positions that were made targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetterSequence {
    pub level: u32,
    pub letters: String,
    pub targets: Vec<usize>,
}

impl LetterSequence {
    /// Every position whose letter equals the one `level` steps earlier,
    /// including matches that arose by chance in the base draw.
    pub fn matches(&self) -> Vec<usize> {
        let bytes = self.letters.as_bytes();
        let n = self.level as usize;
        (n..bytes.len())
            .filter(|&i| bytes[i] == bytes[i - n])
            .collect()
    }
}

/// Draw a letter sequence for an N-back block.
///
/// The base sequence never repeats a letter immediately. Target positions are
/// drawn uniformly from `[level + 2, length)` with pairwise spacing of at
/// least `level + 2`; each target copies the letter `level` steps back.
pub fn generate_letter_sequence<R: Rng>(
    level: u32,
    targets: usize,
    length: usize,
    rng: &mut R,
) -> Result<LetterSequence> {
    ensure!(level > 0, "N-back level must be positive");
    let n = level as usize;
    let spacing = n + 2;
    ensure!(
        length > spacing,
        "sequence of {} letters is too short for {}-back",
        length,
        level
    );

    let mut letters = Vec::with_capacity(length);
    let mut previous = rng.gen_range(0..ALPHABET.len());
    letters.push(ALPHABET[previous]);
    while letters.len() < length {
        let mut idx = rng.gen_range(0..ALPHABET.len() - 1);
        if idx >= previous {
            idx += 1;
        }
        letters.push(ALPHABET[idx]);
        previous = idx;
    }

    let positions = target_positions(targets, spacing, length, rng)?;
    for &j in &positions {
        letters[j] = letters[j - n];
    }

    Ok(LetterSequence {
        level,
        letters: String::from_utf8(letters).context("letters are ASCII")?,
        targets: positions,
    })
}

/// Uniformly choose `count` positions in `[spacing, length)` that are at
/// least `spacing` apart.
///
/// Shifting the k-th sorted position down by `k * (spacing - 1)` maps valid
/// placements one-to-one onto plain subsets of a smaller range.
fn target_positions<R: Rng>(
    count: usize,
    spacing: usize,
    length: usize,
    rng: &mut R,
) -> Result<Vec<usize>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let slots = length - spacing;
    let squeeze = (count - 1) * (spacing - 1);
    if squeeze >= slots || slots - squeeze < count {
        bail!(
            "cannot place {} targets {} apart in {} letters",
            count,
            spacing,
            length
        );
    }
    let mut picks = index::sample(rng, slots - squeeze, count).into_vec();
    picks.sort_unstable();
    Ok(picks
        .into_iter()
        .enumerate()
        .map(|(k, q)| spacing + q + k * (spacing - 1))
        .collect())
}

/// Parse the block order typed by the experimenter, e.g. `1-2-3`.
pub fn parse_level_sequence(text: &str) -> Result<Vec<u32>> {
    let levels = text
        .split('-')
        .map(|part| {
            part.trim()
                .parse::<u32>()
                .with_context(|| format!("invalid N-back level '{}'", part.trim()))
        })
        .collect::<Result<Vec<_>>>()?;
    ensure!(
        levels.len() == 3,
        "expected three levels like 1-2-3, got '{}'",
        text
    );
    ensure!(
        levels.iter().all(|&n| n > 0),
        "N-back levels must be positive"
    );
    Ok(levels)
}

pub fn format_level_sequence(levels: &[u32]) -> String {
    levels
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lighting {
    Darkness,
    RatherDark,
    LowLight,
    RatherBright,
    Bright,
}

impl Lighting {
    pub fn description(self) -> &'static str {
        match self {
            Lighting::Darkness => "Complete Darkness (0–5 lux)",
            Lighting::RatherDark => "Rather Dark (10–50 lux)",
            Lighting::LowLight => "Low Light (≈200 lux)",
            Lighting::RatherBright => "Rather Bright (300–500 lux)",
            Lighting::Bright => "Bright Light (>1000 lux)",
        }
    }
}

/// The four dimmer conditions in random order, always followed by bright light.
pub fn lighting_order<R: Rng>(rng: &mut R) -> Vec<Lighting> {
    let mut order = vec![
        Lighting::Darkness,
        Lighting::RatherDark,
        Lighting::LowLight,
        Lighting::RatherBright,
    ];
    order.shuffle(rng);
    order.push(Lighting::Bright);
    order
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialPlan {
    pub trial: usize,
    pub run: String,
    pub lighting: Lighting,
    pub lighting_description: String,
    pub blocks: Vec<LetterSequence>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPlan {
    pub participant: String,
    pub level_sequence: String,
    pub trials: Vec<TrialPlan>,
}

/// Lighting and letter sequences for every trial of a session. Lighting
/// conditions cycle through [`lighting_order`] when there are more than five
/// trials.
pub fn plan_session<R: Rng>(
    participant: &str,
    design: &SessionDesign,
    rng: &mut R,
) -> Result<SessionPlan> {
    let lighting = lighting_order(rng);
    let mut trials = Vec::with_capacity(design.trials);
    for trial in 1..=design.trials {
        let condition = lighting[(trial - 1) % lighting.len()];
        let blocks = design
            .levels
            .iter()
            .map(|&level| {
                generate_letter_sequence(level, design.targets, design.sequence_length, rng)
            })
            .collect::<Result<Vec<_>>>()?;
        trials.push(TrialPlan {
            trial,
            run: format!("Run{}", trial),
            lighting: condition,
            lighting_description: condition.description().to_string(),
            blocks,
        });
    }
    Ok(SessionPlan {
        participant: participant.to_string(),
        level_sequence: format_level_sequence(&design.levels),
        trials,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialPaths {
    pub dir: PathBuf,
    pub main: PathBuf,
    pub eye_data: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLayout {
    pub root: PathBuf,
    pub trials: Vec<TrialPaths>,
}

pub fn session_dir_name(participant: &str, started: NaiveDateTime) -> String {
    format!("{}_{}", participant, started.format("%Y%m%d_%H%M%S"))
}

/// Create `<base>/<participant>_<timestamp>/trial_<k>/` with header-only
/// `main.csv` and `eye_data.csv` for each trial.
pub fn create_session(
    base: &Path,
    participant: &str,
    trials: usize,
    started: NaiveDateTime,
) -> Result<SessionLayout> {
    let participant = participant.trim();
    ensure!(!participant.is_empty(), "participant ID is empty");
    ensure!(
        !participant.contains(['/', '\\']) && participant != "." && participant != "..",
        "participant ID '{}' is not a valid folder name",
        participant
    );
    let root = base.join(session_dir_name(participant, started));
    let mut layout = SessionLayout {
        root: root.clone(),
        trials: Vec::with_capacity(trials),
    };
    for trial in 1..=trials {
        let dir = root.join(format!("trial_{}", trial));
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let main = dir.join("main.csv");
        write_header(&main, &MAIN_HEADER)?;
        let eye_data = dir.join("eye_data.csv");
        write_header(&eye_data, &EYE_DATA_HEADER)?;
        layout.trials.push(TrialPaths {
            dir,
            main,
            eye_data,
        });
    }
    info!("created session folder {}", root.display());
    Ok(layout)
}

fn write_header(path: &Path, header: &[&str]) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new().from_writer(file);
    writer.write_record(header)?;
    writer.flush()?;
    Ok(())
}

pub fn write_plan(path: &Path, plan: &SessionPlan) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, plan)?;
    Ok(())
}

pub fn read_plan(path: &Path) -> Result<SessionPlan> {
    let file = fs::File::open(path).with_context(|| format!("opening plan {}", path.display()))?;
    let plan = serde_json::from_reader(file)
        .with_context(|| format!("parsing plan {}", path.display()))?;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::{rngs::StdRng, SeedableRng};
    use tempfile::tempdir;

    fn started() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .and_then(|d| d.and_hms_opt(9, 5, 1))
            .unwrap()
    }

    #[test]
    fn sequence_has_targets_at_their_positions() {
        let mut rng = StdRng::seed_from_u64(42);
        for level in 1..=3 {
            let seq = generate_letter_sequence(level, 10, 70, &mut rng).unwrap();
            let bytes = seq.letters.as_bytes();
            assert_eq!(bytes.len(), 70);
            assert!(bytes.iter().all(u8::is_ascii_uppercase));
            assert_eq!(seq.targets.len(), 10);
            let spacing = level as usize + 2;
            for pair in seq.targets.windows(2) {
                assert!(pair[1] - pair[0] >= spacing);
            }
            for &t in &seq.targets {
                assert!(t >= spacing && t < 70);
                assert_eq!(bytes[t], bytes[t - level as usize]);
            }
            let matches = seq.matches();
            assert!(seq.targets.iter().all(|t| matches.contains(t)));
        }
    }

    #[test]
    fn base_draw_has_no_immediate_repeats_for_two_back() {
        let mut rng = StdRng::seed_from_u64(1);
        let seq = generate_letter_sequence(2, 0, 70, &mut rng).unwrap();
        assert!(seq
            .letters
            .as_bytes()
            .windows(2)
            .all(|w| w[0] != w[1]));
    }

    #[test]
    fn same_seed_same_sequence() {
        let a = generate_letter_sequence(2, 10, 70, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = generate_letter_sequence(2, 10, 70, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn tightest_packing_is_accepted_and_one_more_rejected() {
        // 3-back: spacing 5, positions 5..66 hold 13 targets in exactly one way
        let mut rng = StdRng::seed_from_u64(5);
        let seq = generate_letter_sequence(3, 13, 66, &mut rng).unwrap();
        assert_eq!(
            seq.targets,
            (0..13).map(|k| 5 + 5 * k).collect::<Vec<_>>()
        );
        assert!(generate_letter_sequence(3, 14, 66, &mut rng).is_err());
        assert!(generate_letter_sequence(3, 14, 70, &mut rng).is_err());
    }

    #[test]
    fn rejects_zero_level() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(generate_letter_sequence(0, 1, 70, &mut rng).is_err());
    }

    #[test]
    fn parses_level_sequences() {
        assert_eq!(parse_level_sequence("1-2-3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_level_sequence(" 3 - 1 - 2 ").unwrap(), vec![3, 1, 2]);
        assert!(parse_level_sequence("1-2").is_err());
        assert!(parse_level_sequence("1-x-3").is_err());
        assert!(parse_level_sequence("0-1-2").is_err());
        assert_eq!(format_level_sequence(&[2, 3, 1]), "2-3-1");
    }

    #[test]
    fn bright_light_is_always_last() {
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..10 {
            let order = lighting_order(&mut rng);
            assert_eq!(order.len(), 5);
            assert_eq!(order[4], Lighting::Bright);
            assert!(!order[..4].contains(&Lighting::Bright));
        }
    }

    #[test]
    fn plan_covers_every_trial_and_level() {
        let design = SessionDesign::default();
        let plan = plan_session("P01", &design, &mut StdRng::seed_from_u64(4)).unwrap();
        assert_eq!(plan.trials.len(), 5);
        assert_eq!(plan.level_sequence, "1-2-3");
        assert_eq!(plan.trials[4].lighting, Lighting::Bright);
        assert_eq!(plan.trials[0].run, "Run1");
        assert!(plan.trials.iter().all(|t| t.blocks.len() == 3));
    }

    #[test]
    fn creates_trial_folders_with_headers() {
        let dir = tempdir().unwrap();
        let layout = create_session(dir.path(), "P07", 2, started()).unwrap();
        assert_eq!(layout.root, dir.path().join("P07_20240307_090501"));
        assert_eq!(layout.trials.len(), 2);
        let eye = fs::read_to_string(&layout.trials[1].eye_data).unwrap();
        assert_eq!(
            eye,
            "Participant ID,Run ID,Timestamp,Left Pupil Dilation,Right Pupil Dilation,Blink\n"
        );
        let main = fs::read_to_string(&layout.trials[0].main).unwrap();
        assert!(main.starts_with("Participant ID,Run ID,Timestamp,Stimulus,N-back Level,"));
    }

    #[test]
    fn rejects_path_like_participant() {
        let dir = tempdir().unwrap();
        assert!(create_session(dir.path(), "../x", 1, started()).is_err());
        assert!(create_session(dir.path(), "  ", 1, started()).is_err());
    }

    #[test]
    fn reads_design_and_plan() {
        let dir = tempdir().unwrap();
        let design_path = dir.path().join("design.toml");
        fs::write(&design_path, "trials = 2\nlevels = [2, 1, 3]\n").unwrap();
        let design = read_design(&design_path).unwrap();
        assert_eq!(design.trials, 2);
        assert_eq!(design.targets, 10);

        let plan = plan_session("P02", &design, &mut StdRng::seed_from_u64(8)).unwrap();
        let plan_path = dir.path().join("plan.json");
        write_plan(&plan_path, &plan).unwrap();
        let back = read_plan(&plan_path).unwrap();
        assert_eq!(back.level_sequence, "2-1-3");
        assert_eq!(back.trials[1].blocks[0], plan.trials[1].blocks[0]);
    }
}

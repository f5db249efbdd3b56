use std::fmt;

use chrono::{DateTime, Duration, Utc};
use lesson_core::model::{
    AnswerCode, ConceptId, ExerciseId, ExerciseProgress, LessonId, LessonMetadata, SectionId,
    SectionProgress,
};
use storage::repository::{SectionTimeRecord, Storage};

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    lesson_id: LessonId,
    concepts: u32,
    completed: u32,
    exercises: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidLessonId { raw: String },
    InvalidConcepts { raw: String },
    InvalidCompleted { raw: String },
    InvalidExercises { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidLessonId { raw } => write!(f, "invalid --lesson-id value: {raw}"),
            ArgsError::InvalidConcepts { raw } => write!(f, "invalid --concepts value: {raw}"),
            ArgsError::InvalidCompleted { raw } => write!(f, "invalid --completed value: {raw}"),
            ArgsError::InvalidExercises { raw } => write!(f, "invalid --exercises value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("FASTLEARNERS_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut lesson_id = std::env::var("FASTLEARNERS_LESSON_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| LessonId::new(1), LessonId::new);
        let mut concepts = std::env::var("FASTLEARNERS_CONCEPTS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(3);
        let mut completed = std::env::var("FASTLEARNERS_COMPLETED")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(2);
        let mut exercises = std::env::var("FASTLEARNERS_EXERCISES")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(4);
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--lesson-id" => {
                    let value = require_value(&mut args, "--lesson-id")?;
                    let parsed: u64 = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidLessonId { raw: value.clone() })?;
                    lesson_id = LessonId::new(parsed);
                }
                "--concepts" => {
                    let value = require_value(&mut args, "--concepts")?;
                    concepts = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidConcepts { raw: value.clone() })?;
                }
                "--completed" => {
                    let value = require_value(&mut args, "--completed")?;
                    completed = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidCompleted { raw: value.clone() })?;
                }
                "--exercises" => {
                    let value = require_value(&mut args, "--exercises")?;
                    exercises = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidExercises { raw: value.clone() })?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            lesson_id,
            concepts,
            completed,
            exercises,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --lesson-id <id>          Lesson id to seed progress for (default: 1)");
    eprintln!("  --concepts <n>            Concept sections in the lesson (default: 3)");
    eprintln!("  --completed <n>           Canonical sections to mark completed (default: 2)");
    eprintln!("  --exercises <n>           Exercise progress rows to upsert (default: 4)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!(
        "  FASTLEARNERS_DB_URL, FASTLEARNERS_LESSON_ID, FASTLEARNERS_CONCEPTS, FASTLEARNERS_COMPLETED, FASTLEARNERS_EXERCISES"
    );
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    let mut sections = Vec::with_capacity(args.concepts as usize + 3);
    sections.push(SectionId::Overview);
    for i in 0..args.concepts {
        sections.push(SectionId::Concept(ConceptId::new(u64::from(i + 1))));
    }
    sections.push(SectionId::SummaryApplication);
    sections.push(SectionId::GeneralExercises);

    let total = u32::try_from(sections.len()).unwrap_or(u32::MAX);
    let completed = args.completed.min(total);

    let mut metadata =
        LessonMetadata::new(args.lesson_id, args.concepts as usize, now - Duration::hours(1));
    let last_completed = if completed == 0 {
        None
    } else {
        Some(sections[(completed - 1) as usize])
    };
    metadata.update_completion(completed, last_completed, now);
    storage.progress.upsert_metadata(&metadata).await?;

    for (index, section_id) in sections.iter().take(completed as usize).enumerate() {
        let minutes_ago = i64::try_from(completed as usize - index).unwrap_or(1) * 10;
        let completed_at = now - Duration::minutes(minutes_ago);

        let mut section = SectionProgress::new(*section_id, 0);
        section.record_attempt();
        section.mark_completed(completed_at);
        storage
            .progress
            .upsert_section_progress(args.lesson_id, &section)
            .await?;

        let record = SectionTimeRecord {
            lesson_id: args.lesson_id,
            section_id: *section_id,
            started_at: completed_at - Duration::minutes(5),
            ended_at: completed_at,
            paused_secs: 30,
            time_spent_secs: 270,
        };
        storage.section_times.record_section_time(&record).await?;
    }

    for i in 0..args.exercises {
        let mut exercise = ExerciseProgress::new(ExerciseId::new(u64::from(100 + i)));
        if i % 3 == 0 {
            exercise.record_result(AnswerCode::new('C')?, false, now - Duration::minutes(2));
        }
        exercise.record_result(AnswerCode::new('A')?, true, now - Duration::minutes(1));
        storage
            .progress
            .upsert_exercise_progress(args.lesson_id, &exercise)
            .await?;
    }

    println!(
        "Seeded lesson {} with {} completed sections and {} exercise rows into {}",
        args.lesson_id.value(),
        completed,
        args.exercises,
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

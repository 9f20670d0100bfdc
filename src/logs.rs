use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex, OnceLock},
    thread,
};

use anyhow::Result;
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    {ContentLimit, FileRotate},
};
use log::Log;
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

const LOG_LEVEL: LevelFilter = LevelFilter::Info;
const LOG_DIR: &str = "logs";
const MAX_LOG_FILES: usize = 3;
const LINES_PER_LOG_FILE: usize = 1000;

static DISPATCHER: OnceLock<LogDispatcher> = OnceLock::new();

/// Hands formatted lines to a background thread which forwards them to the
/// subscriber, so a slow subscriber never stalls the caller of `log!`.
pub struct LogDispatcher {
    inbox: mpsc::Sender<String>,
    sink: Arc<Mutex<Option<mpsc::Sender<String>>>>,
}

impl LogDispatcher {
    pub fn start() -> Result<Self> {
        let (inbox, receiver) = mpsc::channel::<String>();
        let sink: Arc<Mutex<Option<mpsc::Sender<String>>>> = Arc::new(Mutex::new(None));
        let thread_sink = sink.clone();
        thread::Builder::new()
            .name("log_dispatcher".to_string())
            .spawn(move || {
                while let Ok(line) = receiver.recv() {
                    let maybe_sink = thread_sink.lock().unwrap().clone();
                    if let Some(sink) = maybe_sink {
                        if sink.send(line).is_err() {
                            // subscriber went away
                            thread_sink.lock().unwrap().take();
                        }
                    }
                }
            })?;
        Ok(LogDispatcher { inbox, sink })
    }

    pub fn forward(&self, line: String) {
        // best-effort, a dead dispatcher just drops the line
        let _ = self.inbox.send(line);
    }

    pub fn set_sink(&self, sink: mpsc::Sender<String>) {
        *self.sink.lock().unwrap() = Some(sink);
    }
}

pub fn format_line(record: &log::Record) -> String {
    format!("{}:{} -- {}", record.level(), record.target(), record.args())
}

pub struct MainLogger {
    write_logger: Box<WriteLogger<FileRotate<AppendTimestamp>>>,
}

impl Log for MainLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= LOG_LEVEL
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.write_logger.log(record);
        match DISPATCHER.get() {
            Some(dispatcher) => dispatcher.forward(format_line(record)),
            None => eprintln!("{}", format_line(record)),
        }
    }

    fn flush(&self) {
        self.write_logger.flush();
    }
}

/// Installs the process wide logger writing rotated files under
/// `<cache_dir>/logs`.
pub fn init(cache_dir: &str) -> Result<()> {
    if DISPATCHER.get().is_none() {
        let _ = DISPATCHER.set(LogDispatcher::start()?);
    }

    let rotate = FileRotate::new(
        Path::new(cache_dir).join(LOG_DIR).join("main.log"),
        AppendTimestamp::default(FileLimit::MaxFiles(MAX_LOG_FILES)),
        ContentLimit::Lines(LINES_PER_LOG_FILE),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    let config = ConfigBuilder::new().set_time_format_rfc3339().build();
    let main_logger = MainLogger {
        write_logger: WriteLogger::new(LOG_LEVEL, config, rotate),
    };
    log::set_boxed_logger(Box::new(main_logger))?;
    log::set_max_level(LOG_LEVEL);
    Ok(())
}

/// Forwards every formatted log line to `sink` from now on.
pub fn set_log_sink(sink: mpsc::Sender<String>) {
    match DISPATCHER.get() {
        Some(dispatcher) => dispatcher.set_sink(sink),
        None => warn!("[logs] log sink set before the logger was initialized"),
    }
}

/// Current and rotated log files, oldest name first.
pub fn log_files(cache_dir: &str) -> Result<Vec<PathBuf>> {
    let log_dir = Path::new(cache_dir).join(LOG_DIR);
    if !log_dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(&log_dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Packs every log file into an uncompressed zip at `target_file_path`.
pub fn export(cache_dir: &str, target_file_path: &str) -> Result<()> {
    let mut zip = zip::ZipWriter::new(File::create(target_file_path)?);
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    for path in log_files(cache_dir)? {
        if let Some(name) = path.strip_prefix(cache_dir)?.to_str() {
            zip.start_file(name, options)?;
            io::copy(&mut File::open(&path)?, &mut zip)?;
        }
    }
    zip.finish()?;
    Ok(())
}

//! Terminal client: drives a session and its engine from line commands.

use crate::commands::{Command, CommandError, help_text};
use pairsketch_core::shapes::DrawableObject;
use pairsketch_core::{
    Config, ConfigError, DecodeError, DisplayList, EditorContext, NativeTransport, SessionError, SessionManager,
    SyncEngine, Transport,
};
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Delay between loop turns.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("Image upload failed: {0}")]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Launch options.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub config: Config,
    /// Peer to connect to once our identifier is known
    pub connect: Option<String>,
}

/// One client: session, engine and editor wired together.
pub struct App<T: Transport> {
    session: SessionManager<T>,
    engine: SyncEngine<DisplayList>,
    editor: EditorContext,
    last_status: String,
    running: bool,
}

impl<T: Transport> App<T> {
    pub fn new(transport: T, config: &AppConfig) -> Self {
        let mut engine = SyncEngine::new(DisplayList::new(config.config.surface_size()));
        engine.configure(&config.config);
        Self::from_parts(transport, engine, config)
    }

    /// Build around an existing engine, e.g. one with a custom decoder.
    pub fn from_parts(transport: T, engine: SyncEngine<DisplayList>, config: &AppConfig) -> Self {
        let mut session = SessionManager::new(transport);
        if let Some(remote) = &config.connect {
            session = session.with_auto_connect(remote.clone());
        }
        Self {
            session,
            engine,
            editor: EditorContext::from_config(&config.config),
            last_status: String::new(),
            running: true,
        }
    }

    pub fn session(&self) -> &SessionManager<T> {
        &self.session
    }

    pub fn engine(&self) -> &SyncEngine<DisplayList> {
        &self.engine
    }

    pub fn editor(&self) -> &EditorContext {
        &self.editor
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Register with the transport.
    pub fn start(&mut self) -> Result<(), AppError> {
        self.session.open()?;
        self.engine.render();
        Ok(())
    }

    /// Run one loop turn. Returns the new status line if it changed.
    pub fn tick(&mut self) -> Option<String> {
        self.session.pump(&mut self.engine);
        if self.session.status() != self.last_status {
            self.last_status = self.session.status().to_string();
            return Some(self.last_status.clone());
        }
        None
    }

    /// Parse and run one command line, writing any reply to `out`.
    pub fn handle_line(&mut self, line: &str, out: &mut dyn Write) -> Result<(), AppError> {
        if line.trim().is_empty() {
            return Ok(());
        }
        let command: Command = line.parse()?;
        self.execute(command, out)
    }

    pub fn execute(&mut self, command: Command, out: &mut dyn Write) -> Result<(), AppError> {
        log::debug!("Executing {:?}", command);
        match command {
            Command::Id => match self.session.local_id() {
                Some(id) => writeln!(out, "Your ID: {}", id)?,
                None => writeln!(out, "Waiting for ID...")?,
            },
            Command::Connect(peer) => {
                self.session.connect(&peer, &mut self.engine)?;
            }
            Command::Close => self.session.close(&mut self.engine),
            Command::Tool(tool) => {
                self.editor.tool = tool;
                writeln!(out, "Tool: {}", tool)?;
            }
            Command::Color(color) => self.editor.color = color,
            Command::Size(size) => self.editor.size = size.max(1.0),
            Command::Down(point) => self.editor.pointer_down(point, &mut self.engine),
            Command::Move(point, modifiers) => self.editor.pointer_move(point, modifiers, &mut self.engine),
            Command::Up(point) => self.editor.pointer_up(point, &mut self.engine),
            Command::Image(path) => {
                let bytes = std::fs::read(&path)?;
                self.engine.insert_image_bytes(&bytes)?;
                log::info!("Decoding {}", path.display());
            }
            Command::Clear => self.engine.clear_scene(),
            Command::Grid => {
                let on = self.engine.toggle_grid();
                writeln!(out, "Grid: {}", if on { "on" } else { "off" })?;
            }
            Command::List => self.write_objects(out)?,
            Command::Status => self.write_status(out)?,
            Command::Help => write!(out, "{}", help_text())?,
            Command::Quit => {
                self.session.close(&mut self.engine);
                self.running = false;
            }
        }
        self.session.flush(&mut self.engine);
        Ok(())
    }

    fn write_objects(&self, out: &mut dyn Write) -> io::Result<()> {
        let scene = self.engine.scene();
        if scene.is_empty() {
            return writeln!(out, "Scene is empty");
        }
        for (index, object) in scene.snapshot().enumerate() {
            match object {
                DrawableObject::Shape(shape) => writeln!(
                    out,
                    "{:3} {:8} ({}, {}) -> ({}, {}) {} {}",
                    index,
                    object.kind_name(),
                    shape.start.x,
                    shape.start.y,
                    shape.end.x,
                    shape.end.y,
                    shape.style.stroke_color,
                    shape.style.stroke_width
                )?,
                DrawableObject::Image(image) => writeln!(
                    out,
                    "{:3} {:8} {}x{} at ({}, {})",
                    index,
                    object.kind_name(),
                    image.width,
                    image.height,
                    image.position.x,
                    image.position.y
                )?,
                DrawableObject::Stroke(_) => writeln!(out, "{:3} {:8}", index, object.kind_name())?,
            }
        }
        Ok(())
    }

    fn write_status(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{}", self.session.status())?;
        writeln!(
            out,
            "Tool: {}  Color: {}  Size: {}  Grid: {}",
            self.editor.tool,
            self.editor.color,
            self.editor.size,
            if self.engine.scene().grid_enabled() { "on" } else { "off" }
        )?;
        writeln!(
            out,
            "Objects: {}  Pending images: {}",
            self.engine.scene().len(),
            self.engine.pending_decodes()
        )
    }
}

impl App<NativeTransport> {
    /// Run the client against the configured broker until `quit` or EOF.
    pub fn run(config: AppConfig) -> Result<(), AppError> {
        log::info!("Connecting to broker at {}", config.config.broker_url);
        let transport = NativeTransport::new(config.config.broker_url.clone());
        let mut app = App::new(transport, &config);
        app.start()?;

        let lines = spawn_stdin_reader();
        let stdout = io::stdout();
        writeln!(stdout.lock(), "Type 'help' for commands.")?;

        while app.is_running() {
            if let Some(status) = app.tick() {
                writeln!(stdout.lock(), "{}", status)?;
            }

            loop {
                match lines.try_recv() {
                    Ok(line) => {
                        let mut out = stdout.lock();
                        if let Err(e) = app.handle_line(&line, &mut out) {
                            writeln!(out, "Error: {}", e)?;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        log::info!("Input closed");
                        app.execute(Command::Quit, &mut io::sink())?;
                        break;
                    }
                }
            }

            thread::sleep(FRAME_INTERVAL);
        }

        log::info!("Exiting");
        Ok(())
    }
}

/// Read stdin lines on a background thread.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

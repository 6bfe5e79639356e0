use anyhow::{Context, Result};
use clap::Parser;
use delve_core::{
    agent::{Adventurer, AdventurerState},
    config::SimulationConfig,
    dungeon::{CellKind, Dungeon, Hazard},
    pathfinding::RiskAffinity,
    simulation::{SimEvent, Simulation},
};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    collections::VecDeque,
    fs::File,
    io::{self, Stdout},
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Number of recent events kept for the event panel.
const EVENT_LOG_LEN: usize = 12;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Dungeon layout file to load
    #[arg(short, long, value_name = "MAP_FILE", default_value = "maps/dungeon01.txt")]
    map: PathBuf,

    /// JSON simulation config; missing fields take their defaults
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Adventurers entering at start, spread evenly over risk affinities
    #[arg(short, long, default_value_t = 4)]
    adventurers: usize,

    /// Seed for every random source, overriding the config file
    #[arg(long)]
    seed: Option<u64>,

    /// Run without a terminal UI and print a summary
    #[arg(long)]
    headless: bool,

    /// Tick limit for headless runs
    #[arg(long, default_value_t = 2_000)]
    ticks: u64,

    /// Write logs to this file (the TUI otherwise logs nowhere)
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

struct App {
    /// The core simulation.
    simulation: Simulation,
    /// Most recent events, newest last.
    recent_events: VecDeque<(u64, SimEvent)>,
    /// Flag to control the main loop.
    should_quit: bool,
    paused: bool,
}

impl App {
    fn new(simulation: Simulation) -> Self {
        App {
            simulation,
            recent_events: VecDeque::with_capacity(EVENT_LOG_LEN),
            should_quit: false,
            paused: false,
        }
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) {
        if self.paused || self.simulation.is_finished() {
            return;
        }
        let report = self.simulation.process_tick();
        for event in report.events {
            if self.recent_events.len() == EVENT_LOG_LEN {
                self.recent_events.pop_front();
            }
            self.recent_events.push_back((report.tick, event));
        }
    }

    fn spawn_random(&mut self) {
        let risk = RiskAffinity::new(rand::random::<f64>());
        self.simulation.spawn_adventurer(risk);
    }

    fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_file.as_deref(), args.headless)?;

    let config = load_config(args.config.as_deref(), args.seed)?;
    let layout = std::fs::read_to_string(&args.map)
        .with_context(|| format!("reading map file {}", args.map.display()))?;
    let dungeon = Dungeon::from_layout(&layout, config.trap_damage)
        .with_context(|| format!("parsing map file {}", args.map.display()))?;

    let mut simulation = Simulation::new(dungeon, config)?;
    for risk in spread_risk(args.adventurers) {
        simulation.spawn_adventurer(risk);
    }

    if args.headless {
        return run_headless(simulation, args.ticks);
    }

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    let mut app = App::new(simulation);

    let result = run_app(&mut terminal, &mut app);

    // Restore the terminal state even if the loop failed
    restore_terminal(&mut terminal)?;

    result
}

/// Installs the fmt subscriber. Filtering follows `RUST_LOG`, defaulting to `info`.
fn init_tracing(log_file: Option<&Path>, headless: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None if headless => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .try_init();
        }
        // stderr would draw over the alternate screen
        None => {}
    }
    Ok(())
}

fn load_config(path: Option<&Path>, seed: Option<u64>) -> Result<SimulationConfig> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => SimulationConfig::default(),
    };
    if seed.is_some() {
        config.seed = seed;
    }
    config.validate()?;
    Ok(config)
}

/// Evenly spaced risk affinities from fully cautious to fully reckless.
fn spread_risk(count: usize) -> impl Iterator<Item = RiskAffinity> {
    (0..count).map(move |i| {
        if count > 1 {
            RiskAffinity::new(i as f64 / (count - 1) as f64)
        } else {
            RiskAffinity::new(0.5)
        }
    })
}

fn run_headless(mut simulation: Simulation, max_ticks: u64) -> Result<()> {
    while simulation.tick() < max_ticks && !simulation.is_finished() {
        simulation.process_tick();
    }
    info!(
        ticks = simulation.tick(),
        finished = simulation.is_finished(),
        "headless run complete"
    );

    println!("ticks: {}", simulation.tick());
    for adventurer in simulation.adventurers() {
        println!(
            "adventurer {:>2}  risk {:.2}  health {:>3}  {:<9}  at {}",
            adventurer.id,
            adventurer.risk_affinity.get(),
            adventurer.health,
            format!("{:?}", adventurer.state),
            adventurer.position
        );
    }
    println!("lures left: {}", simulation.dungeon().lures().count());
    Ok(())
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    KeyCode::Char(' ') => app.toggle_pause(),
                    KeyCode::Char('a') => app.spawn_random(),
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(3)])
        .split(frame.area());
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(rows[0]);
    let panels = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(columns[1]);

    render_map(frame, columns[0], &app.simulation);
    render_adventurers(frame, panels[0], &app.simulation);
    render_events(frame, panels[1], &app.recent_events);

    let status = if app.simulation.is_finished() {
        "finished"
    } else if app.paused {
        "paused"
    } else {
        "running"
    };
    let help_text = Paragraph::new(format!(
        "tick {} ({status})  |  'a' spawn  'space' pause  'q'/'Esc' quit",
        app.simulation.tick()
    ))
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, rows[1]);
}

fn adventurer_style(adventurer: &Adventurer, threshold: f64) -> Style {
    if adventurer.risk_affinity.get() > threshold {
        Style::default().fg(Color::LightRed).bold()
    } else {
        Style::default().fg(Color::Cyan).bold()
    }
}

/// Renders the dungeon grid with hazards, lures and adventurers.
fn render_map(frame: &mut Frame, area: Rect, simulation: &Simulation) {
    let dungeon = simulation.dungeon();
    let threshold = simulation.config().lure_interest_threshold;
    let mut lines: Vec<Line> = Vec::with_capacity(dungeon.height());

    for (position, cell) in dungeon.grid().enumerate() {
        if position.x == 0 {
            lines.push(Line::default());
        }
        let adventurer = simulation
            .adventurers()
            .find(|a| a.is_exploring() && a.position == position);

        let span = if let Some(adventurer) = adventurer {
            Span::styled("@", adventurer_style(adventurer, threshold))
        } else if let Some(lure) = cell.lure {
            let glyph = if lure.strength() >= 7 { "$" } else { "¢" };
            Span::styled(glyph, Style::default().fg(Color::Yellow))
        } else if let Some(hazard) = cell.hazard {
            let glyph = match hazard {
                Hazard::Trap { .. } => "^",
                Hazard::Monster { alive: true } => "M",
                Hazard::Monster { alive: false } => "m",
            };
            let style = if hazard.is_threat() {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            Span::styled(glyph, style)
        } else {
            match cell.kind() {
                CellKind::Entrance => Span::styled("E", Style::default().fg(Color::Green)),
                CellKind::Exit => Span::styled("X", Style::default().fg(Color::Green).bold()),
                CellKind::Empty => Span::styled(".", Style::default().fg(Color::DarkGray)),
            }
        };

        if let Some(line) = lines.last_mut() {
            line.spans.push(span);
            line.spans.push(Span::raw(" "));
        }
    }

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Dungeon").borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}

/// Renders one line per adventurer: risk, health, state and current lure.
fn render_adventurers(frame: &mut Frame, area: Rect, simulation: &Simulation) {
    let threshold = simulation.config().lure_interest_threshold;
    let items: Vec<ListItem> = simulation
        .adventurers()
        .map(|adventurer| {
            let state = match adventurer.state {
                AdventurerState::Exploring => match adventurer.lure_target {
                    Some(target) => format!("chasing lure at {target}"),
                    None => "heading for exit".to_string(),
                },
                AdventurerState::Escaped => "escaped".to_string(),
                AdventurerState::Slain => "slain".to_string(),
            };
            ListItem::from(Line::from(vec![
                Span::styled(
                    format!("#{:<2} ", adventurer.id),
                    adventurer_style(adventurer, threshold),
                ),
                Span::raw(format!(
                    "risk {:.2}  hp {:>3}  {} {}",
                    adventurer.risk_affinity.get(),
                    adventurer.health,
                    adventurer.position,
                    state
                )),
            ]))
        })
        .collect();

    let list =
        List::new(items).block(Block::default().borders(Borders::ALL).title("Adventurers"));
    frame.render_widget(list, area);
}

fn describe(event: &SimEvent) -> String {
    match event {
        SimEvent::Moved { adventurer, to, .. } => format!("#{adventurer} moved to {to}"),
        SimEvent::LureCollected {
            adventurer,
            at,
            strength,
        } => format!("#{adventurer} grabbed a lure ({strength}) at {at}"),
        SimEvent::TrapTriggered {
            adventurer,
            at,
            damage,
        } => format!("#{adventurer} triggered a trap at {at} for {damage}"),
        SimEvent::TrapRearmed { at } => format!("trap at {at} re-armed"),
        SimEvent::MonsterEncountered { adventurer, at } => {
            format!("#{adventurer} ran into a monster at {at}")
        }
        SimEvent::Escaped { adventurer } => format!("#{adventurer} escaped"),
        SimEvent::Slain { adventurer, at } => format!("#{adventurer} was slain at {at}"),
    }
}

fn render_events(frame: &mut Frame, area: Rect, events: &VecDeque<(u64, SimEvent)>) {
    let items: Vec<ListItem> = events
        .iter()
        .rev()
        .map(|(tick, event)| ListItem::new(format!("[{tick:>5}] {}", describe(event))))
        .collect();
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Events"));
    frame.render_widget(list, area);
}

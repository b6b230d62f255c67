// Kbstate CLI
// Replays a key event script through a keyboard and prints every notification

use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use kbstate_core::settings::{default_settings_content, Settings};
use kbstate_core::{KeyEvent, Keyboard, KeyboardBackend, Keymap, Leds, TableKeymap};

/// Keyboard state inspector
#[derive(Parser, Debug)]
#[command(name = "kbstate")]
#[command(version)]
#[command(about = "Replay key events through a keyboard state machine", long_about = None)]
struct Args {
    /// Event script (reads stdin when omitted)
    #[arg(value_name = "SCRIPT")]
    script: Option<PathBuf>,

    /// TOML settings file (default: ~/.config/kbstate/settings.toml)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Use the built-in pc105 table keymap even when XKB is available
    #[arg(long)]
    table: bool,

    /// Print the serialized keymap and exit
    #[arg(long)]
    dump_keymap: bool,

    /// Print a commented default settings file and exit
    #[arg(long)]
    print_default_config: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// One line of an event script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Press(u32),
    Release(u32),
    Mods {
        depressed: u32,
        latched: u32,
        locked: u32,
        group: u32,
    },
    Repeat(i32, i32),
    Reload,
}

fn parse_u32(token: &str) -> Result<u32> {
    let value = match token.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => token.parse(),
    };
    value.with_context(|| format!("invalid number '{}'", token))
}

fn parse_i32(token: &str) -> Result<i32> {
    token
        .parse()
        .with_context(|| format!("invalid number '{}'", token))
}

/// Parse a script line; blank lines and `#` comments yield `None`
fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
        return Ok(None);
    }
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let command = match tokens.as_slice() {
        ["press", code] => Command::Press(parse_u32(code)?),
        ["release", code] => Command::Release(parse_u32(code)?),
        ["mods", depressed, latched, locked, group] => Command::Mods {
            depressed: parse_u32(depressed)?,
            latched: parse_u32(latched)?,
            locked: parse_u32(locked)?,
            group: parse_u32(group)?,
        },
        ["repeat", rate, delay] => Command::Repeat(parse_i32(rate)?, parse_i32(delay)?),
        ["reload"] => Command::Reload,
        _ => bail!("unrecognized command '{}'", line),
    };
    Ok(Some(command))
}

/// Backend that prints indicator updates instead of driving hardware
struct PrintingBackend;

impl KeyboardBackend for PrintingBackend {
    fn led_update(&mut self, leds: Leds) {
        println!("leds {:?}", leds);
    }

    fn destroy(self: Box<Self>) {
        log::debug!("Backend released");
    }
}

fn subscribe_printers<K: Keymap + 'static>(keyboard: &Keyboard<K>) {
    let events = keyboard.events();
    events.key.subscribe(|event| println!("{}", event));
    events.modifiers.subscribe(|kb| {
        let mods = kb.modifiers();
        println!(
            "modifiers depressed={:#x} latched={:#x} locked={:#x} group={} active={:?}",
            mods.depressed,
            mods.latched,
            mods.locked,
            mods.group,
            kb.get_modifiers()
        );
    });
    events.keymap.subscribe(|kb| {
        let size = kb.serialized_keymap().map(|s| s.size()).unwrap_or(0);
        println!("keymap installed ({} bytes), active={:?}", size, kb.get_modifiers());
    });
    events.repeat_info.subscribe(|kb| {
        let info = kb.repeat_info();
        println!("repeat rate={} delay={}", info.rate, info.delay);
    });
    events.destroy.subscribe(|kb| {
        println!("destroy ({} keys held)", kb.num_keycodes());
    });
}

/// Compiles the keymap a keyboard runs with from the current settings
type KeymapBuilder<K> = fn(&Settings) -> Result<K>;

fn table_keymap(_settings: &Settings) -> Result<TableKeymap> {
    Ok(TableKeymap::pc105())
}

#[cfg(feature = "xkb")]
fn xkb_keymap(settings: &Settings) -> Result<kbstate_core::XkbKeymap> {
    kbstate_core::XkbKeymap::from_names(settings.rule_names())
        .context("failed to compile keymap from settings")
}

/// Re-read the settings file and apply it to a running keyboard
///
/// Without a settings file the current settings are kept and the keymap is
/// rebuilt from them.
fn reload<K: Keymap>(
    keyboard: &mut Keyboard<K>,
    settings: &mut Settings,
    build: KeymapBuilder<K>,
) -> Result<()> {
    if let Some(path) = settings.source_path() {
        log::debug!("Reloading settings from {}", path.display());
        settings.reload().context("failed to reload settings")?;
    } else {
        log::debug!("No settings file, reinstalling keymap");
    }

    keyboard.set_keymap(Rc::new(build(settings)?))?;
    let repeat = settings.repeat_info();
    keyboard.set_repeat_info(repeat.rate, repeat.delay);
    Ok(())
}

fn run<K: Keymap + 'static>(
    mut settings: Settings,
    build: KeymapBuilder<K>,
    args: &Args,
) -> Result<()> {
    let keymap = build(&settings)?;
    if args.dump_keymap {
        print!("{}", keymap.serialize()?);
        return Ok(());
    }

    let mut keyboard =
        Keyboard::with_backend(PrintingBackend).with_repeat_info(settings.repeat_info());
    subscribe_printers(&keyboard);
    keyboard.set_keymap(Rc::new(keymap))?;

    let reader: Box<dyn BufRead> = match &args.script {
        Some(path) => Box::new(BufReader::new(
            std::fs::File::open(path)
                .with_context(|| format!("failed to open script {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let command = parse_command(&line).with_context(|| format!("line {}", number + 1))?;
        match command {
            Some(Command::Press(code)) => keyboard.notify_key(&KeyEvent::pressed(code)),
            Some(Command::Release(code)) => keyboard.notify_key(&KeyEvent::released(code)),
            Some(Command::Mods {
                depressed,
                latched,
                locked,
                group,
            }) => keyboard.notify_modifiers(depressed, latched, locked, group),
            Some(Command::Repeat(rate, delay)) => keyboard.set_repeat_info(rate, delay),
            Some(Command::Reload) => reload(&mut keyboard, &mut settings, build)?,
            None => {}
        }
    }

    keyboard.destroy();
    Ok(())
}

fn load_settings(args: &Args) -> Result<Settings> {
    let settings = match &args.config {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::load_default().context("failed to load default settings")?,
    };
    log::debug!("Settings: {:?}", settings);
    Ok(settings)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if args.print_default_config {
        print!("{}", default_settings_content());
        return Ok(());
    }

    let settings = load_settings(&args)?;
    start(settings, &args)
}

#[cfg(feature = "xkb")]
fn start(settings: Settings, args: &Args) -> Result<()> {
    if args.table {
        return run(settings, table_keymap, args);
    }
    run(settings, xkb_keymap, args)
}

#[cfg(not(feature = "xkb"))]
fn start(settings: Settings, args: &Args) -> Result<()> {
    if !args.table {
        log::debug!("Built without XKB, using the pc105 table keymap");
    }
    run(settings, table_keymap, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["kbstate", "events.txt", "--config", "/tmp/kb.toml"]);

        assert_eq!(args.script, Some(PathBuf::from("events.txt")));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/kb.toml")));
        assert!(!args.table);
        assert!(!args.dump_keymap);
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_flags() {
        let args = Args::parse_from(["kbstate", "--table", "--dump-keymap", "-v"]);

        assert!(args.script.is_none());
        assert!(args.table);
        assert!(args.dump_keymap);
        assert!(args.verbose);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("press 42").unwrap(), Some(Command::Press(42)));
        assert_eq!(parse_command("  release 0x2a ").unwrap(), Some(Command::Release(42)));
        assert_eq!(
            parse_command("mods 1 0 2 1").unwrap(),
            Some(Command::Mods {
                depressed: 1,
                latched: 0,
                locked: 2,
                group: 1
            })
        );
        assert_eq!(parse_command("repeat 30 -1").unwrap(), Some(Command::Repeat(30, -1)));
        assert_eq!(parse_command("reload").unwrap(), Some(Command::Reload));
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        assert_eq!(parse_command("").unwrap(), None);
        assert_eq!(parse_command("   # just a comment").unwrap(), None);
        assert_eq!(parse_command("press 58 # caps").unwrap(), Some(Command::Press(58)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_command("press").is_err());
        assert!(parse_command("press shift").is_err());
        assert!(parse_command("jump 1").is_err());
        assert!(parse_command("mods 1 2 3").is_err());
    }

    #[test]
    fn test_parse_max_keycode() {
        assert_eq!(
            parse_command("press 0xffffffff").unwrap(),
            Some(Command::Press(u32::MAX))
        );
    }

    #[test]
    fn test_reload_applies_settings_file() {
        let path =
            std::env::temp_dir().join(format!("kbstate-reload-{}.toml", std::process::id()));
        std::fs::write(&path, "[repeat]\nrate = 25\ndelay = 600\n").unwrap();
        let mut settings = Settings::from_file(&path).unwrap();

        let mut keyboard: Keyboard<TableKeymap> = Keyboard::new();
        keyboard.set_keymap(Rc::new(table_keymap(&settings).unwrap())).unwrap();
        let first = Rc::clone(keyboard.keymap().unwrap());

        std::fs::write(&path, "[repeat]\nrate = 40\ndelay = 200\n").unwrap();
        reload(&mut keyboard, &mut settings, table_keymap).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(settings.repeat_info().rate, 40);
        assert_eq!(keyboard.repeat_info().rate, 40);
        assert_eq!(keyboard.repeat_info().delay, 200);
        assert!(!Rc::ptr_eq(keyboard.keymap().unwrap(), &first));
    }

    #[test]
    fn test_reload_without_settings_file_reinstalls_keymap() {
        let mut settings = Settings::new();
        let mut keyboard: Keyboard<TableKeymap> = Keyboard::new();
        keyboard.notify_key(&KeyEvent::pressed(42));

        reload(&mut keyboard, &mut settings, table_keymap).unwrap();

        assert!(keyboard.has_keymap());
        assert_eq!(keyboard.repeat_info(), settings.repeat_info());
        assert_eq!(keyboard.get_modifiers(), kbstate_core::Modifiers::SHIFT);
    }

    #[test]
    fn test_default_config_loads() {
        let settings = Settings::from_toml(default_settings_content()).unwrap();
        assert_eq!(settings.rule_names().model, "pc105");
    }
}

use std::env;
use std::thread;
use std::time::Duration;
use whiteboard::{EventCursor, SlotId, Whiteboard, name};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn usage(program: &str) -> ! {
    eprintln!(
        "Usage: {program} info | post <slot> <text> | get <slot> | watch <slot> [count] | unlink"
    );
    eprintln!("The whiteboard name is taken from ${}.", name::NAME_ENV);
    std::process::exit(1);
}

fn program_name(args: &[String]) -> &str {
    args.first().map_or("whiteboard", String::as_str)
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> whiteboard::Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let program = program_name(&args);
    if args.len() < 2 {
        usage(program);
    }
    let slot = |i: usize| -> whiteboard::Result<SlotId> {
        let Some(arg) = args.get(i) else {
            usage(program);
        };
        let Ok(index) = arg.parse::<usize>() else {
            usage(program);
        };
        SlotId::new(index)
    };

    match args[1].as_str() {
        "info" => info(&Whiteboard::open_default()?),
        "post" => {
            let slot = slot(2)?;
            let Some(text) = args.get(3) else {
                usage(program);
            };
            let wb = Whiteboard::open_default()?;
            let count = wb.publisher().post_array(slot, text.as_bytes())?;
            println!("slot {slot}: event {count}");
            Ok(())
        }
        "get" => {
            let slot = slot(2)?;
            let wb = Whiteboard::open_default()?;
            print_slot(&wb, slot);
            Ok(())
        }
        "watch" => {
            let slot = slot(2)?;
            let limit = match args.get(3) {
                Some(arg) => match arg.parse::<usize>() {
                    Ok(limit) => Some(limit),
                    Err(_) => usage(program),
                },
                None => None,
            };
            let wb = Whiteboard::open_default()?;
            watch(&wb, wb.cursor(slot), slot, limit);
            Ok(())
        }
        "unlink" => whiteboard::unlink(&name::default_name()),
        _ => usage(program),
    }
}

fn info(wb: &Whiteboard) -> whiteboard::Result<()> {
    println!("name:        {}", wb.name().unwrap_or("-"));
    println!("version:     {}", wb.version());
    println!(
        "geometry:    {} slots × {} generations × {} bytes",
        whiteboard::SLOT_COUNT,
        whiteboard::GENERATIONS,
        whiteboard::BUFFER_SIZE
    );
    println!("events:      {}", wb.global_event_count());
    for slot in SlotId::all() {
        let count = wb.event_count(slot);
        if count != 0 {
            println!(
                "slot {slot:>3}:    {count} events, generation {}",
                wb.write_index(slot)
            );
        }
    }
    Ok(())
}

fn print_slot(wb: &Whiteboard, slot: SlotId) {
    match wb.read_consistent(slot) {
        Some(snapshot) => {
            let bytes: Vec<u8> = snapshot.array();
            println!(
                "slot {slot} event {}: {}",
                snapshot.event_count,
                String::from_utf8_lossy(&bytes)
            );
        }
        None => eprintln!("slot {slot}: writer too busy for a consistent read"),
    }
}

fn watch(wb: &Whiteboard, mut cursor: EventCursor, slot: SlotId, limit: Option<usize>) {
    let mut seen = 0;
    while limit.is_none_or(|limit| seen < limit) {
        if cursor.poll() {
            print_slot(wb, slot);
            seen += 1;
        } else {
            thread::sleep(POLL_INTERVAL);
        }
    }
}

use jvmcheck::demos::Demo;
use jvmcheck::jvm::class_graph::{ClassGraph, ClassGraphArenas};
use jvmcheck::search::Search;
use jvmcheck::vm::{Error, Settings, Vm};

use clap::builder::PossibleValuesParser;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::process;

fn main() -> Result<(), Error> {
    env_logger::init();

    let demo_names: Vec<&'static str> = Demo::ALL.iter().map(|demo| demo.name()).collect();
    let matches = Command::new("JVM bytecode model checker")
        .version(clap::crate_version!())
        .author("Alec Theriault <alec.theriault@gmail.com>")
        .about("Explore every thread interleaving of a bundled demo program")
        .arg(
            Arg::new("DEMO")
                .help("Demo program to check")
                .required_unless_present("list")
                .value_parser(PossibleValuesParser::new(demo_names))
                .index(1),
        )
        .arg(
            Arg::new("list")
                .long("list")
                .action(ArgAction::SetTrue)
                .help("List the bundled demos and exit"),
        )
        .arg(
            Arg::new("all-violations")
                .long("all-violations")
                .action(ArgAction::SetTrue)
                .help("Keep searching after the first violated property"),
        )
        .arg(
            Arg::new("print-end-states")
                .long("print-end-states")
                .action(ArgAction::SetTrue)
                .help("Print the choices leading to every completed path"),
        )
        .arg(
            Arg::new("max-depth")
                .long("max-depth")
                .value_name("CHOICES")
                .value_parser(value_parser!(usize))
                .help("Don't explore past this many nested choice points"),
        )
        .arg(
            Arg::new("max-transition-length")
                .long("max-transition-length")
                .value_name("INSTRUCTIONS")
                .value_parser(value_parser!(usize))
                .help("Force a scheduling point after this many instructions in one thread"),
        )
        .arg(
            Arg::new("max-heap")
                .long("max-heap")
                .value_name("OBJECTS")
                .value_parser(value_parser!(usize))
                .help("Throw OutOfMemoryError past this many live heap objects"),
        )
        .arg(
            Arg::new("max-array-length")
                .long("max-array-length")
                .value_name("ELEMENTS")
                .value_parser(value_parser!(usize))
                .help("Throw OutOfMemoryError when allocating a longer array"),
        )
        .arg(
            Arg::new("max-stack")
                .long("max-stack")
                .value_name("FRAMES")
                .value_parser(value_parser!(usize))
                .help("Throw StackOverflowError past this many frames in one thread"),
        )
        .arg(
            Arg::new("lock-threshold")
                .long("lock-threshold")
                .value_name("ACCESSES")
                .value_parser(value_parser!(u32))
                .help("Accesses under a common lock before a field is assumed lock protected"),
        )
        .arg(
            Arg::new("break-single-choice")
                .long("break-single-choice")
                .action(ArgAction::SetTrue)
                .help("Register scheduling points even when only one thread can run"),
        )
        .arg(
            Arg::new("no-break-start")
                .long("no-break-start")
                .action(ArgAction::SetTrue)
                .help("Don't break transitions at Thread.start"),
        )
        .arg(
            Arg::new("no-break-notify")
                .long("no-break-notify")
                .action(ArgAction::SetTrue)
                .help("Don't break transitions at notify and notifyAll"),
        )
        .arg(
            Arg::new("no-break-lock-release")
                .long("no-break-lock-release")
                .action(ArgAction::SetTrue)
                .help("Don't break transitions when a lock is released"),
        )
        .arg(
            Arg::new("no-exposure")
                .long("no-exposure")
                .action(ArgAction::SetTrue)
                .help("Don't break when a shared object stores a reference to an unshared one"),
        )
        .arg(
            Arg::new("no-sync-detection")
                .long("no-sync-detection")
                .action(ArgAction::SetTrue)
                .help("Don't skip choice points on fields which look lock protected"),
        )
        .arg(pattern_arg("never-break-on-type", "CLASS", "Classes whose accesses never break"))
        .arg(pattern_arg("always-break-on-type", "CLASS", "Classes whose accesses always break"))
        .arg(pattern_arg("never-break-in-method", "METHOD", "Methods which never break"))
        .arg(pattern_arg("never-break-on-field", "FIELD", "Fields whose accesses never break"))
        .arg(pattern_arg("always-break-on-field", "FIELD", "Fields whose accesses always break"))
        .get_matches();

    if matches.get_flag("list") {
        for demo in Demo::ALL {
            println!("{:<22} {}", demo.name(), demo.description());
        }
        return Ok(());
    }

    let demo = matches
        .get_one::<String>("DEMO")
        .and_then(|name| Demo::from_name(name))
        .ok_or_else(|| Error::InvalidEntryPoint(String::from("no demo selected")))?;
    let settings = settings_from(&matches);
    let print_end_states = matches.get_flag("print-end-states");

    let class_graph_arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&class_graph_arenas);
    let java = class_graph.insert_java_library_types()?;

    log::info!("Building demo '{}'", demo.name());
    let main = demo.build(&class_graph, &java)?;
    let mut vm = Vm::new(java, settings);
    vm.start(main)?;

    let mut end_states = 0;
    let report = Search::new(&mut vm)
        .on_end_state(|_, path| {
            end_states += 1;
            if print_end_states {
                let choices: Vec<String> = path
                    .iter()
                    .map(|record| format!("{}:{:?}", record.id, record.choice))
                    .collect();
                println!("end state {}: {}", end_states, choices.join(" "));
            }
        })
        .run()?;

    println!("{}", report.statistics);
    if report.is_clean() {
        println!("no errors detected");
        return Ok(());
    }
    for violation in &report.violations {
        println!("\nerror: {}", violation);
    }
    process::exit(1);
}

fn pattern_arg(name: &'static str, value_name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name(value_name)
        .action(ArgAction::Append)
        .help(help)
}

/// Defaults, overridden by whatever flags were passed
fn settings_from(matches: &ArgMatches) -> Settings {
    let mut settings = Settings::new();

    settings.stop_on_first_violation = !matches.get_flag("all-violations");
    settings.max_search_depth = matches.get_one::<usize>("max-depth").copied();
    if let Some(length) = matches.get_one::<usize>("max-transition-length") {
        settings.max_transition_length = *length;
    }
    if let Some(objects) = matches.get_one::<usize>("max-heap") {
        settings.max_heap_objects = *objects;
    }
    if let Some(length) = matches.get_one::<usize>("max-array-length") {
        settings.max_array_length = *length;
    }
    if let Some(frames) = matches.get_one::<usize>("max-stack") {
        settings.max_stack_depth = *frames;
    }
    if let Some(threshold) = matches.get_one::<u32>("lock-threshold") {
        settings.lock_threshold = *threshold;
    }

    settings.break_single_choice = matches.get_flag("break-single-choice");
    settings.break_start = !matches.get_flag("no-break-start");
    settings.break_notify = !matches.get_flag("no-break-notify");
    settings.break_lock_release = !matches.get_flag("no-break-lock-release");
    settings.break_on_exposure = !matches.get_flag("no-exposure");
    settings.sync_detection = !matches.get_flag("no-sync-detection");

    let patterns = |name: &str| -> Vec<String> {
        matches
            .get_many::<String>(name)
            .map(|values| values.cloned().collect())
            .unwrap_or_default()
    };
    settings.never_break_on_types.extend(patterns("never-break-on-type"));
    settings.always_break_on_types.extend(patterns("always-break-on-type"));
    settings.never_break_in_methods.extend(patterns("never-break-in-method"));
    settings.never_break_on_fields.extend(patterns("never-break-on-field"));
    settings.always_break_on_fields.extend(patterns("always-break-on-field"));

    settings
}

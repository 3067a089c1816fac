use std::path::PathBuf;
use wikibot::{
    Config, Registry,
    generators::{DEFAULT_QUEUE_SIZE, GeneratorFactory, PreloadingGenerator, ThreadedGenerator},
};

fn usage<T>(err: &str) -> anyhow::Result<T> {
    let exe = std::env::args().next().unwrap_or_default();
    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    println!("Usage: {exe} [options] <generator options>...\n");
    println!("Options:");
    println!("    --config <path>: Configuration file (default: ${})", wikibot::config::CONFIG_ENV);
    println!("    --family <name>: Wiki family (default: from configuration)");
    println!("    --lang <code>: Language code (default: from configuration)");
    println!("    --preload: Load page text in bulk and print its size\n");
    println!("Generator options:");
    println!("    -cat:C -catr:C -subcats:C -subcatsr:C -ref:P -links:P -imagelinks:P");
    println!("    -interwiki:P -transcludes:T -start:T -prefix:T -file:F -page:P");
    println!("    -search:Q -usercontribs:U -namespace:N -titleregex:R -noredirect");
    println!("    -limit:N\n");
    Err(anyhow::Error::msg(err.to_string()))
}

fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        return usage("Help requested");
    }
    let config_path = args.opt_value_from_str::<_, PathBuf>("--config")?;
    let family = args.opt_value_from_str::<_, String>("--family")?;
    let lang = args.opt_value_from_str::<_, String>("--lang")?;
    let preload = args.contains("--preload");
    let _ = args.contains("--");

    let mut config = Config::load(config_path.as_deref())?;
    if let Some(family) = family {
        config.family = family;
    }
    if let Some(lang) = lang {
        config.code = lang;
    }

    let registry = Registry::new(config)?;
    let site = registry.default_site()?;
    log::info!("Working on {site}");

    let mut factory = GeneratorFactory::new(&site);
    for arg in args.finish() {
        let Some(arg) = arg.to_str() else {
            return usage("Arguments must be valid UTF-8");
        };
        if !factory.handle_arg(arg)? {
            return usage(&format!("Unknown argument {arg}"));
        }
    }
    let Some(pages) = factory.build() else {
        return usage("No generator options given");
    };

    let mut count = 0_usize;
    if preload {
        for page in PreloadingGenerator::with_defaults(pages)? {
            let mut page = page?;
            match page.get(false, true) {
                Ok(text) => println!("{}\t{}", page.title(), text.len()),
                Err(err) if err.is_page_error() => println!("{}\t({err})", page.title()),
                Err(err) => return Err(err.into()),
            }
            count += 1;
        }
    } else {
        // Listing continues while titles are printed.
        for page in ThreadedGenerator::new(pages.map(Ok), DEFAULT_QUEUE_SIZE)? {
            println!("{}", page?.title());
            count += 1;
        }
    }

    log::info!("{count} page(s)");
    registry.shutdown();
    Ok(())
}

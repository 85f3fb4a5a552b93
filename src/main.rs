use anyhow::{anyhow, ensure, Result};
use clap::Parser;
use crossbeam_channel::unbounded;
use crossbeam_utils::thread;
use lazy_int_set::OrderedIntSet;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Runs a smoke check, then hammers one `OrderedIntSet` from several threads and verifies it.
#[derive(Parser, Debug)]
struct Args {
    /// Number of worker threads.
    #[arg(long, default_value_t = 8)]
    threads: usize,

    /// Operations per worker.
    #[arg(long, default_value_t = 100_000)]
    ops: usize,

    /// Keys are drawn from `0..key_range`.
    #[arg(long, default_value_t = 1024)]
    key_range: i64,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn smoke() -> Result<()> {
    let set = OrderedIntSet::new();

    ensure!(set.insert(5));
    ensure!(set.insert(3));
    ensure!(!set.insert(5));
    ensure!(set.to_vec() == vec![3, 5]);
    ensure!(set.len() == 2);

    ensure!(set.delete(3));
    ensure!(set.to_vec() == vec![5]);
    ensure!(set.len() == 1);

    ensure!(!set.delete(3));
    ensure!(!set.contains(3));
    ensure!(set.contains(5));
    set.check_invariants()?;
    Ok(())
}

fn stress(args: &Args) -> Result<()> {
    ensure!(args.key_range > 0, "--key-range must be positive");

    let set = OrderedIntSet::new();
    let (sender, receiver) = unbounded();

    thread::scope(|s| {
        for t in 0..args.threads {
            let set = &set;
            let sender = sender.clone();
            s.spawn(move |_| {
                let mut rng = StdRng::seed_from_u64(args.seed.wrapping_add(t as u64));
                let mut net = 0isize;
                for _ in 0..args.ops {
                    let key = rng.gen_range(0..args.key_range);
                    match rng.gen_range(0..3) {
                        0 => {
                            if set.insert(key) {
                                net += 1;
                            }
                        }
                        1 => {
                            if set.delete(key) {
                                net -= 1;
                            }
                        }
                        _ => {
                            set.contains(key);
                        }
                    }
                }
                sender.send(net).unwrap();
            });
        }
    })
    .map_err(|_| anyhow!("a worker thread panicked"))?;
    drop(sender);

    let expected: isize = receiver.iter().sum();
    set.check_invariants()?;
    ensure!(
        set.len() as isize == expected,
        "len() is {} but workers inserted a net {}",
        set.len(),
        expected
    );
    info!(
        "{} threads x {} ops: {} keys left, {:?}",
        args.threads,
        args.ops,
        set.len(),
        set.to_vec().iter().take(8).collect::<Vec<_>>()
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    smoke()?;
    info!("smoke check passed");
    stress(&args)
}

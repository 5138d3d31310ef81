use anyhow::Context;

use pic18_port::arch::pic18::sim::Pic18Core;
use pic18_port::task::{InitialFrame, TaskStack};
use pic18_port::{AddressTier, Port, PortConfig, SchedulerHooks};

/// Entry points and parameters of the demo tasks.
const TASKS: [(u16, u16); 3] = [(0x0800, 0x00A1), (0x0A00, 0x00B2), (0x0C00, 0x00C3)];

/// Bytes of locals each demo task gets on top of the minimal stack.
const TASK_LOCALS: usize = 32;

struct RoundRobin {
    stacks: Vec<TaskStack>,
    current: usize,
    ticks: u32,
}

impl SchedulerHooks for RoundRobin {
    fn current_stack(&mut self) -> &mut TaskStack {
        &mut self.stacks[self.current]
    }

    fn switch_context(&mut self) {
        self.current = (self.current + 1) % self.stacks.len();
    }

    fn increment_tick(&mut self) -> bool {
        self.ticks += 1;
        true
    }
}

struct Args {
    large: bool,
    scratch: u16,
    ticks: u32,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args { large: false, scratch: 0, ticks: 6 };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--large" => args.large = true,
            "--scratch" => {
                let v = it.next().context("--scratch precisa de um valor")?;
                args.scratch = v.parse().with_context(|| format!("--scratch invalido: {}", v))?;
            }
            "--ticks" => {
                let v = it.next().context("--ticks precisa de um valor")?;
                args.ticks = v.parse().with_context(|| format!("--ticks invalido: {}", v))?;
            }
            other => anyhow::bail!("argumento desconhecido: {}", other),
        }
    }
    Ok(args)
}

fn console(args: std::fmt::Arguments) {
    print!("{}", args);
}

fn dump(image: &[u8]) {
    for (i, chunk) in image.chunks(8).enumerate() {
        let bytes: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        println!("  +{:03} {}", i * 8, bytes.join(" "));
    }
}

fn main() -> anyhow::Result<()> {
    let args = parse_args()?;
    pic18_port::util::set_console(console);

    let rom_words = if args.large { 0x1_0000 } else { 0x4000 };
    let cfg = PortConfig::from_toolchain(rom_words, args.scratch)
        .map_err(|e| anyhow::anyhow!("configuracao invalida: {:?}", e))?;

    let mut port = Port::new(Pic18Core::new(&cfg), cfg);
    println!(
        "sim: tier={:?} scratch={} min_stack={} frame={}",
        cfg.tier,
        cfg.scratch_bytes,
        port.minimal_stack_size(),
        InitialFrame::len(&cfg)
    );

    let mut stacks = Vec::with_capacity(TASKS.len());
    for &(entry, param) in &TASKS {
        let mut stack = TaskStack::for_config(&cfg, TASK_LOCALS)
            .map_err(|e| anyhow::anyhow!("stack da task {:#06x}: {:?}", entry, e))?;
        port.initialise_stack(&mut stack, entry, param);
        stacks.push(stack);
    }

    println!("sim: imagem inicial da task {:#06x} (topo primeiro):", TASKS[0].0);
    dump(stacks[0].image());

    let mut sched = RoundRobin { stacks, current: 0, ticks: 0 };
    port.start_scheduler(&mut sched)
        .map_err(|e| anyhow::anyhow!("start_scheduler: {:?}", e))?;

    for n in 0..args.ticks {
        let core = port.hardware_mut();
        // A task "executa" alguns bytes antes do proximo tick.
        core.pc += 0x10;
        if !core.raise_tick() {
            anyhow::bail!("tick {} mascarado (nesting={})", n, port.critical_nesting());
        }
        port.tick(&mut sched);

        let core = port.hardware();
        let entry = TASKS[sched.current].0;
        let param = core.argument(sched.current_stack());
        println!(
            "sim: tick={} task={} entry={:#06x} pc={:#06x} param={:#06x}",
            sched.ticks,
            sched.current,
            entry,
            core.pc,
            param
        );
    }

    let tier = if cfg.tier == AddressTier::Large { "large" } else { "small" };
    println!("sim: {} ticks no tier {}, encerrando", sched.ticks, tier);
    port.end_scheduler();
    Ok(())
}

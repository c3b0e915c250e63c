//! Producer-Consumer example with semaphores and a message queue
//!
//! Runs on the host port: the main thread stands in for the tick interrupt
//! and the idle thread.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use ucosiii::port::rt_thread_idle_execute;
use ucosiii::q::OsQ;
use ucosiii::sem::OsSem;
use ucosiii::shell::ucos_cmd;
use ucosiii::task::OsTcb;
use ucosiii::time::{os_time_dly, os_time_tick};
use ucosiii::types::opt;
use ucosiii::{os_task_create, OsError};

static PRODUCED: AtomicU32 = AtomicU32::new(0);
static CONSUMED: AtomicU32 = AtomicU32::new(0);

static SEM: OsSem = OsSem::new();
static QUEUE: OsQ = OsQ::new();
static ITEMS: [u32; 4] = [1, 2, 3, 4];

static PRODUCER_TCB: OsTcb = OsTcb::new();
static CONSUMER_TCB: OsTcb = OsTcb::new();

fn producer_task(_arg: *mut ()) {
    loop {
        let n = PRODUCED.fetch_add(1, Ordering::Relaxed) as usize;
        let item = &ITEMS[n % ITEMS.len()];
        match QUEUE.post(item as *const u32 as *const (), 4, opt::POST_FIFO) {
            Ok(()) => {
                let _ = SEM.post(opt::POST_1);
            }
            Err(OsError::QMax) => println!("[P] queue full"),
            Err(err) => println!("[P] post failed: {}", err),
        }
        let _ = os_time_dly(200, opt::TIME_DLY);
    }
}

fn consumer_task(_arg: *mut ()) {
    loop {
        if SEM.pend(0, opt::PEND_BLOCKING).is_err() {
            return;
        }
        if let Ok(msg) = QUEUE.pend(0, opt::PEND_NON_BLOCKING) {
            // SAFETY: the producer only posts pointers into `ITEMS`.
            let item = unsafe { *(msg.ptr as *const u32) };
            let n = CONSUMED.fetch_add(1, Ordering::Relaxed) + 1;
            println!("[C] consumed #{} (item {})", n, item);
        }
    }
}

fn main() -> Result<(), OsError> {
    println!("Producer-Consumer Demo");

    ucosiii::os_init()?;
    SEM.create("Sem", 0)?;
    QUEUE.create("Queue", 4)?;

    os_task_create(&PRODUCER_TCB, "P", producer_task, core::ptr::null_mut(), 15, 256, 0, 0, opt::TASK_NONE)?;
    os_task_create(&CONSUMER_TCB, "C", consumer_task, core::ptr::null_mut(), 10, 256, 0, 0, opt::TASK_NONE)?;

    println!("Starting...");
    ucosiii::os_start()?;

    for _ in 0..2000 {
        rt_thread_idle_execute();
        os_time_tick();
        std::thread::sleep(Duration::from_micros(500));
    }

    println!(
        "produced {}, consumed {}",
        PRODUCED.load(Ordering::Relaxed),
        CONSUMED.load(Ordering::Relaxed)
    );
    let mut report = String::new();
    let cmds: [&[&str]; 4] = [&[], &["-task"], &["-sem"], &["-q"]];
    for args in cmds {
        let _ = ucos_cmd(args, &mut report);
    }
    print!("{}", report);
    Ok(())
}

//! Kernel entry point: bring the subsystems up in dependency order and hand
//! control to the scheduler.

#![cfg_attr(target_arch = "aarch64", no_std)]
#![cfg_attr(target_arch = "aarch64", no_main)]

#[cfg(target_arch = "aarch64")]
mod kernel_entry {
    extern crate alloc;

    use viper_abi::TaskFlags;
    use viper_hal::println;
    use viper_kernel::{arch, assign, config, fs, ipc, logger, mm, proc, sched, time};

    /// Called from `boot.S` on the boot CPU with a valid stack and zeroed
    /// BSS. Initialization order is load-bearing; each stage depends on the
    /// ones before it. Never returns: `scheduler::start` switches away for
    /// good.
    #[unsafe(no_mangle)]
    pub extern "C" fn kernel_main() -> ! {
        viper_hal::console::init();

        #[cfg(feature = "verbose")]
        logger::init(log::LevelFilter::Trace);
        #[cfg(not(feature = "verbose"))]
        logger::init(log::LevelFilter::Info);

        println!("\nViperOS kernel starting");

        // Physical memory: everything past the fixed reservations.
        mm::pmm::init(
            config::PMM_POOL_BASE,
            config::RAM_BASE + config::RAM_SIZE - config::PMM_POOL_BASE,
        );

        // Translation tables, then turn the identity map on.
        if !mm::vmm::init() {
            panic!("VMM init failed");
        }
        mm::vmm::enable_mmu();

        // Heap before the first Arc/Vec.
        mm::heap::init();

        // Trap handling before anything can fault or interrupt.
        arch::exceptions::init();
        viper_hal::gic::init();
        time::tick::init();

        // Core services.
        ipc::channel::init();
        ipc::poll::init();

        let root_fs = alloc::sync::Arc::new(fs::ramfs::RamFs::new());
        fs::vfs::mount_root(root_fs);
        seed_filesystem();

        proc::init();

        // Scheduling last: idle task, then the init task.
        sched::scheduler::init();
        sched::task::init();

        let init = sched::task::create("init", init_task, 0, TaskFlags::empty());
        match init {
            Some(t) => sched::scheduler::enqueue(t),
            None => panic!("cannot create init task"),
        }

        sched::scheduler::start();
    }

    /// Boot-time namespace: a few directories and the SYS assign.
    fn seed_filesystem() {
        let _ = fs::vfs::mkdir("/", "/sys");
        let _ = fs::vfs::mkdir("/", "/tmp");
        let _ = fs::vfs::mkdir("/", "/dev");
        let _ = assign::set("SYS", "/sys");
        let _ = assign::set("T", "/tmp");
    }

    /// First scheduled task: reports boot, then stays resident reaping
    /// exited tasks and echoing console input.
    extern "C" fn init_task(_arg: usize) {
        log::info!("[init] boot complete, {} ms", time::tick::get_ticks());

        loop {
            let reaped = sched::task::reap_exited();
            if reaped > 0 {
                log::debug!("[init] reaped {} task(s)", reaped);
            }

            while let Some(b) = viper_hal::console::read_byte() {
                // Echo console input; a real shell attaches here later.
                viper_hal::print!("{}", b as char);
            }

            let _ = ipc::poll::sleep_ms(50);
        }
    }

    #[panic_handler]
    fn panic(info: &core::panic::PanicInfo) -> ! {
        println!("\nKERNEL PANIC: {}", info);
        viper_hal::console::mirror_panic_line("KERNEL PANIC");
        arch::aarch64::halt();
    }
}

#[cfg(not(target_arch = "aarch64"))]
fn main() {
    // The kernel binary only exists for the target; host builds use the
    // library crate and its tests.
}

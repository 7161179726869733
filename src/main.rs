fn main() -> std::process::ExitCode {
    ems_console_lib::run()
}

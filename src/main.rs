fn main() -> anyhow::Result<()> {
    workbench_lib::run()
}
